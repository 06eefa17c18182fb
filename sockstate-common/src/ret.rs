//! The return-state sampler shared by every exit probe.
//!
//! Unlike the entry encoders it does not care which function is returning:
//! every exit word has the same shape, tagged with
//! [`Discriminant::Return`].

use bitflags::bitflags;

use crate::kernel::NETIF_F_SG;
use crate::memory::{KernelRead, Sock};
use crate::word::{Discriminant, Field, StateWord};

bitflags! {
    /// Which general socket fields [`general_state`] samples.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SampleOpts: u32 {
        const SOCK_STATE = 0x1;
        const SK_SHUTDOWN = 0x2;
        const SOCK_FLAGS = 0x4;
        const SK_STATE = 0x8;
        const SK_FLAGS = 0x10;
        const SK_ERR = 0x20;
    }
}

pub const SOCK_STATE: Field = Field::new(32, 4);
pub const SK_SHUTDOWN: Field = Field::new(36, 2);
pub const SOCK_FLAGS: Field = Field::new(40, 4);
pub const SK_STATE: Field = Field::new(44, 4);
pub const SK_FLAGS: Field = Field::new(48, 8);
pub const SK_ERR: Field = Field::bit(56);

pub const NONAGLE: Field = Field::new(4, 4);
pub const REPAIR: Field = Field::bit(8);
pub const DEFER_CONNECT: Field = Field::new(9, 4);
pub const IPV6ONLY: Field = Field::bit(13);
pub const REPAIR_QUEUE: Field = Field::new(14, 2);
pub const BOUND_DEV_IF: Field = Field::bit(18);
pub const FASTOPEN_REQ: Field = Field::bit(19);
pub const ROUTE_CAPS_SG: Field = Field::bit(20);
pub const FASTOPEN_RSK: Field = Field::bit(21);
pub const URG_DATA: Field = Field::bit(22);
pub const URG_SEQ: Field = Field::bit(23);
pub const SAVED_SYN: Field = Field::bit(24);
pub const URG_DATA_AGAIN: Field = Field::bit(25);
pub const URG_SEQ_AGAIN: Field = Field::bit(26);
pub const LINGER2: Field = Field::bit(27);
pub const URG_SEQ_AT_COPIED: Field = Field::bit(28);
pub const LINGERTIME: Field = Field::bit(29);
pub const FRAG_PAGE: Field = Field::bit(30);

const NONAGLE_BITS: u8 = 0xf0;
const REPAIR_BIT: u8 = 0x02;
const DEFER_CONNECT_BITS: u8 = 0xf0;
const IPV6ONLY_BIT: u8 = 0x04;

/// Samples the general socket fields selected by `opts` into bits 32-59.
pub fn general_state<M: KernelRead>(sk: &Sock<'_, M>, opts: SampleOpts) -> u64 {
    let mut word = StateWord::empty();
    let socket = sk.socket();

    if opts.contains(SampleOpts::SOCK_STATE) {
        if let Some(state) = socket.as_ref().and_then(|s| s.state()) {
            word.set(SOCK_STATE, state as u64);
        }
    }
    if opts.contains(SampleOpts::SK_SHUTDOWN) {
        word.set(SK_SHUTDOWN, sk.shutdown().unwrap_or_default() as u64);
    }
    if opts.contains(SampleOpts::SOCK_FLAGS) {
        if let Some(flags) = socket.as_ref().and_then(|s| s.flags()) {
            word.set(SOCK_FLAGS, flags);
        }
    }
    if opts.contains(SampleOpts::SK_STATE) {
        word.set(SK_STATE, sk.state().unwrap_or_default() as u64);
    }
    if opts.contains(SampleOpts::SK_FLAGS) {
        word.set(SK_FLAGS, sk.flags().unwrap_or_default());
    }
    if opts.contains(SampleOpts::SK_ERR) {
        word.set_if(SK_ERR, sk.err().unwrap_or_default() > 0);
    }

    word.bits()
}

/// Snapshot of `sk` at function return.
pub fn return_state<M: KernelRead>(sk: &Sock<'_, M>) -> StateWord {
    let mut word = StateWord::empty();
    word.set(Field::new(32, 28), general_state(sk, SampleOpts::all()) >> 32);

    let bits = sk.repair_bits().unwrap_or_default();
    word.set(NONAGLE, ((bits & NONAGLE_BITS) >> 4) as u64);
    word.set_if(REPAIR, bits & REPAIR_BIT != 0);

    let bits = sk.defer_connect_bits().unwrap_or_default();
    word.set(DEFER_CONNECT, ((bits & DEFER_CONNECT_BITS) >> 4) as u64);

    let bits = sk.ipv6only_bits().unwrap_or_default();
    word.set_if(IPV6ONLY, bits & IPV6ONLY_BIT != 0);

    word.set(REPAIR_QUEUE, sk.repair_queue().unwrap_or_default() as u64);

    word.set_if(BOUND_DEV_IF, sk.bound_dev_if().unwrap_or_default() != 0);
    word.set_if(FASTOPEN_REQ, sk.fastopen_req().unwrap_or_default() != 0);
    word.set_if(
        ROUTE_CAPS_SG,
        sk.route_caps().unwrap_or_default() & NETIF_F_SG != 0,
    );
    word.set_if(FASTOPEN_RSK, sk.fastopen_rsk().unwrap_or_default() != 0);

    let urg_data = sk.urg_data().unwrap_or_default() != 0;
    let urg_seq = sk.urg_seq();
    word.set_if(URG_DATA, urg_data);
    word.set_if(URG_SEQ, urg_seq.unwrap_or_default() != 0);
    word.set_if(SAVED_SYN, sk.saved_syn().unwrap_or_default() != 0);
    // Written a second time at 25/26; consumers key on both positions.
    word.set_if(URG_DATA_AGAIN, urg_data);
    word.set_if(URG_SEQ_AGAIN, urg_seq.unwrap_or_default() != 0);
    word.set_if(LINGER2, sk.linger2().unwrap_or_default() != 0);
    word.set_if(
        URG_SEQ_AT_COPIED,
        matches!((urg_seq, sk.copied_seq()), (Some(urg), Some(copied)) if urg == copied),
    );
    word.set_if(LINGERTIME, sk.lingertime().unwrap_or_default() != 0);
    word.set_if(FRAG_PAGE, sk.frag_page().unwrap_or_default() != 0);

    word.finish(Discriminant::Return)
}
