//! Entry encoders, one per monitored function.
//!
//! Each encoder starts from the function id, ORs in the conditions that
//! matter at that call site and tags the result with
//! [`Discriminant::Entry`]. Sampled values only propagate when they are on
//! the function's allow-list; anything else leaves the range zero.

use crate::catalog::FunctionId;
use crate::kernel::*;
use crate::memory::{KernelRead, MsgHdr, Sock, Socket};
use crate::word::{Discriminant, StateWord};

/// Bit ranges shared by the sock-level encoders.
pub mod fields {
    use crate::word::Field;

    pub const SK_STATE: Field = Field::new(32, 4);
    pub const SK_SHUTDOWN: Field = Field::new(36, 2);
    pub const NONAGLE: Field = Field::new(48, 4);
    pub const REPAIR: Field = Field::bit(52);
    pub const DEFER_CONNECT: Field = Field::new(53, 4);
    pub const REPAIR_QUEUE: Field = Field::new(57, 2);
    /// Call argument slot used by the socket-level probes.
    pub const ARG: Field = Field::bit(4);
    pub const IOCTL_CMD: Field = Field::new(4, 16);
}

use fields::*;

/// In the byte before `repair_queue`: nonagle in the high nibble, repair
/// at bit 1.
const NONAGLE_BITS: u8 = 0xf0;
const REPAIR_BIT: u8 = 0x02;
/// In the byte before `rcv_tos`: defer_connect and its neighbours.
const DEFER_CONNECT_BITS: u8 = 0xf0;

#[inline(always)]
fn nonagle(bits: u8) -> u64 {
    ((bits & NONAGLE_BITS) >> 4) as u64
}

#[inline(always)]
fn repair(bits: u8) -> bool {
    bits & REPAIR_BIT != 0
}

#[inline(always)]
fn defer_connect(bits: u8) -> u64 {
    ((bits & DEFER_CONNECT_BITS) >> 4) as u64
}

/// Low byte of `sk_flags`, which is what the flag filters compare against.
#[inline(always)]
fn sk_flags_byte<M: KernelRead>(sk: &Sock<'_, M>) -> u8 {
    sk.flags().unwrap_or_default() as u8
}

#[inline(always)]
fn sk_state<M: KernelRead>(sk: &Sock<'_, M>) -> u8 {
    sk.state().unwrap_or_default() & 0xf
}

#[inline(always)]
fn sk_shutdown<M: KernelRead>(sk: &Sock<'_, M>) -> u8 {
    sk.shutdown().unwrap_or_default() & 0x3
}

#[inline(always)]
fn present(ptr: Option<u64>) -> bool {
    ptr.unwrap_or_default() != 0
}

/// `urg_seq == copied_seq`, only when both could be read.
#[inline(always)]
fn urg_seq_at_copied<M: KernelRead>(sk: &Sock<'_, M>) -> bool {
    matches!((sk.urg_seq(), sk.copied_seq()), (Some(urg), Some(copied)) if urg == copied)
}

#[inline(always)]
fn is_inq_ioctl(cmd: u32) -> bool {
    matches!(cmd, SIOCINQ | SIOCATMARK | SIOCOUTQ | SIOCOUTQNSD)
}

pub fn tcp_v6_init_sock() -> StateWord {
    StateWord::with_function_id(FunctionId::TcpV6InitSock.id()).finish(Discriminant::Entry)
}

pub fn tcp_v6_connect() -> StateWord {
    StateWord::with_function_id(FunctionId::TcpV6Connect.id()).finish(Discriminant::Entry)
}

pub mod sendmsg {
    use crate::word::Field;

    pub const SK_FLAGS: Field = Field::new(40, 8);
    pub const FASTOPEN_REQ: Field = Field::bit(16);
    pub const FASTOPEN_RSK: Field = Field::bit(17);
    pub const CONTROLLEN: Field = Field::bit(20);
    pub const DATA_LEFT: Field = Field::bit(27);
}

pub fn tcp_sendmsg<M: KernelRead>(sk: &Sock<'_, M>, msg: &MsgHdr<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpSendmsg.id());

    let state = sk_state(sk);
    if matches!(
        state,
        TCP_ESTABLISHED | TCP_CLOSE | TCP_CLOSE_WAIT | TCP_SYN_SENT
    ) {
        word.set(SK_STATE, state as u64);
    }

    let shutdown = sk_shutdown(sk);
    if shutdown == SEND_SHUTDOWN {
        word.set(SK_SHUTDOWN, shutdown as u64);
    }

    let flags = sk_flags_byte(sk);
    if flags == SOCK_ZEROCOPY {
        word.set(sendmsg::SK_FLAGS, flags as u64);
    }

    let bits = sk.repair_bits().unwrap_or_default();
    word.set(NONAGLE, nonagle(bits));
    word.set_if(REPAIR, repair(bits));
    word.set(
        DEFER_CONNECT,
        defer_connect(sk.defer_connect_bits().unwrap_or_default()),
    );
    word.set(REPAIR_QUEUE, sk.repair_queue().unwrap_or_default() as u64);

    word.set_if(sendmsg::FASTOPEN_REQ, present(sk.fastopen_req()));
    word.set_if(sendmsg::FASTOPEN_RSK, present(sk.fastopen_rsk()));

    word.set_if(sendmsg::CONTROLLEN, msg.controllen().unwrap_or_default() != 0);
    word.set_if(sendmsg::DATA_LEFT, msg.data_left().unwrap_or_default() != 0);

    word.finish(Discriminant::Entry)
}

pub mod recvmsg {
    use crate::word::Field;

    pub const SK_FLAGS: Field = Field::new(42, 2);
    pub const URG_DATA: Field = Field::bit(1);
    pub const URG_SEQ_AT_COPIED: Field = Field::bit(2);
    pub const SK_ERR: Field = Field::bit(3);
    pub const MSG_PEEK: Field = Field::bit(4);
    pub const MSG_OOB: Field = Field::bit(5);
    pub const MSG_WAITALL: Field = Field::bit(6);
    pub const MSG_TRUNC: Field = Field::bit(7);
    pub const MSG_ERRQUEUE: Field = Field::bit(8);
    pub const RECEIVE_QUEUE: Field = Field::bit(9);
}

pub fn tcp_recvmsg<M: KernelRead>(sk: &Sock<'_, M>, msg: &MsgHdr<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpRecvmsg.id());

    word.set(SK_STATE, sk_state(sk) as u64);

    let shutdown = sk_shutdown(sk);
    if shutdown == RCV_SHUTDOWN {
        word.set(SK_SHUTDOWN, shutdown as u64);
    }

    let flags = sk_flags_byte(sk);
    if matches!(flags, SOCK_URGINLINE | SOCK_DONE) {
        word.set(recvmsg::SK_FLAGS, flags as u64);
    }

    let bits = sk.repair_bits().unwrap_or_default();
    word.set(NONAGLE, nonagle(bits));
    word.set_if(REPAIR, repair(bits));
    word.set(REPAIR_QUEUE, sk.repair_queue().unwrap_or_default() as u64);

    word.set_if(recvmsg::URG_DATA, sk.urg_data().unwrap_or_default() != 0);
    word.set_if(recvmsg::URG_SEQ_AT_COPIED, urg_seq_at_copied(sk));
    word.set_if(recvmsg::SK_ERR, sk.err().unwrap_or_default() != 0);

    let msg_flags = msg.flags().unwrap_or_default();
    word.set_if(recvmsg::MSG_PEEK, msg_flags & MSG_PEEK != 0);
    word.set_if(recvmsg::MSG_OOB, msg_flags & MSG_OOB != 0);
    word.set_if(recvmsg::MSG_WAITALL, msg_flags & MSG_WAITALL != 0);
    word.set_if(recvmsg::MSG_TRUNC, msg_flags & MSG_TRUNC != 0);
    word.set_if(recvmsg::MSG_ERRQUEUE, msg_flags & MSG_ERRQUEUE != 0);
    word.set_if(
        recvmsg::RECEIVE_QUEUE,
        sk.receive_queue_nonempty().unwrap_or_default(),
    );

    word.finish(Discriminant::Entry)
}

pub mod close {
    use crate::word::Field;

    pub const REPAIR: Field = Field::bit(8);
    pub const LINGER2: Field = Field::bit(12);
    pub const SK_FLAGS: Field = Field::new(18, 3);
    pub const LINGERTIME: Field = Field::bit(24);
}

pub fn tcp_close<M: KernelRead>(sk: &Sock<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpClose.id());

    let state = sk_state(sk);
    if matches!(state, TCP_LISTEN | TCP_FIN_WAIT2 | TCP_CLOSE) {
        word.set(SK_STATE, state as u64);
    }

    word.set_if(close::REPAIR, repair(sk.repair_bits().unwrap_or_default()));
    word.set_if(close::LINGER2, sk.linger2().unwrap_or_default() != 0);

    let flags = sk_flags_byte(sk);
    if flags == SOCK_LINGER {
        word.set(close::SK_FLAGS, flags as u64);
    }

    word.set_if(close::LINGERTIME, sk.lingertime().unwrap_or_default() != 0);

    word.finish(Discriminant::Entry)
}

pub mod shutdown {
    use crate::word::Field;

    pub const HOW: Field = Field::new(4, 8);
    pub const SENDS_FIN: Field = Field::bit(12);
}

/// States in which `tcp_shutdown` goes on to send a FIN.
const SHUTDOWN_FIN_STATES: u32 =
    tcpf(TCP_ESTABLISHED) | tcpf(TCP_SYN_SENT) | tcpf(TCP_SYN_RECV) | tcpf(TCP_CLOSE_WAIT);

pub fn tcp_shutdown<M: KernelRead>(sk: &Sock<'_, M>, how: i32) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpShutdown.id());

    word.set(shutdown::HOW, how as u64);
    word.set_if(
        shutdown::SENDS_FIN,
        tcpf(sk_state(sk)) & SHUTDOWN_FIN_STATES != 0,
    );

    word.finish(Discriminant::Entry)
}

pub mod setsockopt {
    use crate::word::Field;

    pub const SK_FLAGS: Field = Field::new(4, 2);
    pub const REPAIR_QUEUE: Field = Field::new(16, 2);
    pub const REPAIR: Field = Field::bit(20);
    pub const NONAGLE: Field = Field::new(24, 4);
}

pub fn tcp_setsockopt<M: KernelRead>(sk: &Sock<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpSetsockopt.id());

    let state = sk_state(sk);
    if matches!(
        state,
        TCP_ESTABLISHED | TCP_CLOSE | TCP_CLOSE_WAIT | TCP_LISTEN
    ) {
        word.set(SK_STATE, state as u64);
    }

    word.set(
        setsockopt::REPAIR_QUEUE,
        sk.repair_queue().unwrap_or_default() as u64,
    );

    let bits = sk.repair_bits().unwrap_or_default();
    word.set_if(setsockopt::REPAIR, repair(bits));
    word.set(setsockopt::NONAGLE, nonagle(bits));

    let flags = sk_flags_byte(sk);
    if flags == SOCK_KEEPOPEN {
        word.set(setsockopt::SK_FLAGS, flags as u64);
    }

    word.finish(Discriminant::Entry)
}

pub mod getsockopt {
    use crate::word::Field;

    pub const REPAIR_QUEUE: Field = Field::new(16, 2);
    pub const REPAIR: Field = Field::bit(20);
    pub const SAVED_SYN: Field = Field::bit(24);
}

pub fn tcp_getsockopt<M: KernelRead>(sk: &Sock<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::TcpGetsockopt.id());

    let state = sk_state(sk);
    if matches!(state, TCP_CLOSE | TCP_LISTEN) {
        word.set(SK_STATE, state as u64);
    }

    word.set(
        getsockopt::REPAIR_QUEUE,
        sk.repair_queue().unwrap_or_default() as u64,
    );
    word.set_if(
        getsockopt::REPAIR,
        repair(sk.repair_bits().unwrap_or_default()),
    );
    word.set_if(getsockopt::SAVED_SYN, present(sk.saved_syn()));

    word.finish(Discriminant::Entry)
}

/// One word for the listening socket, one for the socket being accepted.
pub fn inet_accept(kern: bool) -> [StateWord; 2] {
    let tagged = |id: FunctionId| {
        let mut word = StateWord::with_function_id(id.id());
        word.set_if(ARG, kern);
        word.finish(Discriminant::Entry)
    };
    [
        tagged(FunctionId::InetAcceptListener),
        tagged(FunctionId::InetAcceptNew),
    ]
}

pub fn inet_listen<M: KernelRead>(sock: &Socket<'_, M>) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::InetListen.id());

    if let Some(sk) = sock.sk() {
        let state = sk_state(&sk);
        if matches!(state, TCP_LISTEN | TCP_CLOSE) {
            word.set(SK_STATE, state as u64);
        }
    }

    word.finish(Discriminant::Entry)
}

fn ioctl(id: FunctionId, cmd: u32) -> StateWord {
    let mut word = StateWord::with_function_id(id.id());
    if is_inq_ioctl(cmd) {
        word.set(IOCTL_CMD, cmd as u64);
    }
    word.finish(Discriminant::Entry)
}

pub fn tcp_ioctl(cmd: u32) -> StateWord {
    ioctl(FunctionId::TcpIoctl, cmd)
}

pub fn inet6_bind() -> StateWord {
    StateWord::with_function_id(FunctionId::Inet6Bind.id()).finish(Discriminant::Entry)
}

pub fn inet6_ioctl(cmd: u32) -> StateWord {
    ioctl(FunctionId::Inet6Ioctl, cmd)
}

pub fn inet6_getname(peer: i32) -> StateWord {
    let mut word = StateWord::with_function_id(FunctionId::Inet6Getname.id());
    word.set_if(ARG, peer == 1);
    word.finish(Discriminant::Entry)
}

/// Every field an encoder may write, for overlap checks.
#[cfg(test)]
pub(crate) fn layout_of(id: FunctionId) -> &'static [crate::word::Field] {
    match id {
        FunctionId::TcpV6InitSock
        | FunctionId::TcpV6Connect
        | FunctionId::Inet6Bind => &[],
        FunctionId::TcpSendmsg => &[
            SK_STATE,
            SK_SHUTDOWN,
            sendmsg::SK_FLAGS,
            NONAGLE,
            REPAIR,
            DEFER_CONNECT,
            REPAIR_QUEUE,
            sendmsg::FASTOPEN_REQ,
            sendmsg::FASTOPEN_RSK,
            sendmsg::CONTROLLEN,
            sendmsg::DATA_LEFT,
        ],
        FunctionId::TcpRecvmsg => &[
            SK_STATE,
            SK_SHUTDOWN,
            recvmsg::SK_FLAGS,
            NONAGLE,
            REPAIR,
            REPAIR_QUEUE,
            recvmsg::URG_DATA,
            recvmsg::URG_SEQ_AT_COPIED,
            recvmsg::SK_ERR,
            recvmsg::MSG_PEEK,
            recvmsg::MSG_OOB,
            recvmsg::MSG_WAITALL,
            recvmsg::MSG_TRUNC,
            recvmsg::MSG_ERRQUEUE,
            recvmsg::RECEIVE_QUEUE,
        ],
        FunctionId::TcpClose => &[
            SK_STATE,
            close::REPAIR,
            close::LINGER2,
            close::SK_FLAGS,
            close::LINGERTIME,
        ],
        FunctionId::TcpShutdown => &[shutdown::HOW, shutdown::SENDS_FIN],
        FunctionId::TcpSetsockopt => &[
            SK_STATE,
            setsockopt::SK_FLAGS,
            setsockopt::REPAIR_QUEUE,
            setsockopt::REPAIR,
            setsockopt::NONAGLE,
        ],
        FunctionId::TcpGetsockopt => &[
            SK_STATE,
            getsockopt::REPAIR_QUEUE,
            getsockopt::REPAIR,
            getsockopt::SAVED_SYN,
        ],
        FunctionId::InetAcceptListener
        | FunctionId::InetAcceptNew
        | FunctionId::Inet6Getname => &[ARG],
        FunctionId::InetListen => &[SK_STATE],
        FunctionId::TcpIoctl | FunctionId::Inet6Ioctl => &[IOCTL_CMD],
    }
}
