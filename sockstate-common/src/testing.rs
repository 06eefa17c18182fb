//! Synthetic kernel memory for exercising the encoders off-target.

use crate::memory::{KernelRead, MsgHdr, Sock, SockLayout, Socket};

pub static LAYOUT: SockLayout = SockLayout {
    sk_state: 0x12,
    sk_bound_dev_if: 0x14,
    sk_shutdown: 0x30,
    sk_flags: 0x38,
    sk_err: 0x40,
    sk_socket: 0x48,
    sk_route_caps: 0x50,
    sk_lingertime: 0x58,
    sk_frag_page: 0x60,
    sk_receive_queue: 0x68,
    inet_rcv_tos: 0x91,
    tcp_repair_queue: 0xa1,
    tcp_fastopen_req: 0xa8,
    tcp_fastopen_rsk: 0xb0,
    tcp_urg_data: 0xb8,
    tcp_urg_seq: 0xbc,
    tcp_copied_seq: 0xc0,
    tcp_saved_syn: 0xc8,
    tcp_linger2: 0xd0,
    socket_state: 0x0,
    socket_flags: 0x8,
    socket_sk: 0x18,
    msg_controllen: 0x20,
    msg_iter_count: 0x30,
    msg_flags: 0x40,
};

pub const SK_ADDR: u64 = 0xffff_8880_0000_1000;
pub const SOCKET_ADDR: u64 = 0xffff_8880_0000_2000;
pub const MSG_ADDR: u64 = 0xffff_c900_0000_3000;
const SKB_ADDR: u64 = 0xffff_8880_0000_4000;

/// Readable regions of fake kernel memory. Anything else faults.
#[derive(Default)]
pub struct Arena {
    regions: Vec<(u64, Vec<u8>)>,
}

impl Arena {
    pub fn map(&mut self, base: u64, len: usize) {
        self.regions.push((base, vec![0; len]));
    }

    fn put(&mut self, addr: u64, bytes: &[u8]) {
        let (base, mem) = self
            .regions
            .iter_mut()
            .find(|(base, mem)| {
                addr >= *base && addr + bytes.len() as u64 <= base + mem.len() as u64
            })
            .expect("write outside mapped region");
        let start = (addr - *base) as usize;
        mem[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl KernelRead for Arena {
    fn read_bytes<const N: usize>(&self, addr: u64) -> Option<[u8; N]> {
        let end = addr.checked_add(N as u64)?;
        self.regions.iter().find_map(|(base, mem)| {
            if addr < *base || end > base + mem.len() as u64 {
                return None;
            }
            let start = (addr - base) as usize;
            mem[start..start + N].try_into().ok()
        })
    }
}

/// Describes one socket (plus its `struct socket` and a `msghdr`) and lays
/// it out in an [`Arena`] at [`LAYOUT`] offsets.
#[derive(Clone, Debug, Default)]
pub struct SockBuilder {
    detached: bool,
    state: u8,
    shutdown: u8,
    flags: u64,
    err: i32,
    bound_dev_if: i32,
    ipv6only_bits: u8,
    route_caps: u64,
    lingertime: u64,
    frag_page: u64,
    receive_queue_len: u32,
    defer_connect_bits: u8,
    repair_bits: u8,
    repair_queue: u8,
    fastopen_req: u64,
    fastopen_rsk: u64,
    urg_data: u16,
    urg_seq: u32,
    copied_seq: u32,
    saved_syn: u64,
    linger2: i32,
    socket_state: u32,
    socket_flags: u64,
    msg_controllen: u64,
    msg_data_left: u64,
    msg_flags: u32,
}

macro_rules! setters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(mut self, value: $ty) -> Self {
                self.$name = value;
                self
            }
        )*
    };
}

impl SockBuilder {
    pub fn new() -> Self {
        SockBuilder::default()
    }

    setters! {
        state: u8,
        shutdown: u8,
        flags: u64,
        err: i32,
        bound_dev_if: i32,
        ipv6only_bits: u8,
        route_caps: u64,
        lingertime: u64,
        frag_page: u64,
        receive_queue_len: u32,
        defer_connect_bits: u8,
        repair_bits: u8,
        repair_queue: u8,
        fastopen_req: u64,
        fastopen_rsk: u64,
        urg_data: u16,
        urg_seq: u32,
        copied_seq: u32,
        saved_syn: u64,
        linger2: i32,
        socket_state: u32,
        socket_flags: u64,
        msg_controllen: u64,
        msg_data_left: u64,
        msg_flags: u32,
    }

    /// `sk->sk_socket == NULL`, as for an orphaned socket.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Sets the `SOCK_*` flag bit `flag` in `sk_flags`.
    pub fn sock_flag(mut self, flag: u8) -> Self {
        self.flags |= 1 << flag;
        self
    }

    pub fn arena(&self) -> Arena {
        let l = &LAYOUT;
        let mut arena = Arena::default();
        arena.map(SK_ADDR, 0x100);
        arena.map(SOCKET_ADDR, 0x40);
        arena.map(MSG_ADDR, 0x50);

        let sk = |off: u32| SK_ADDR + off as u64;
        arena.put(sk(l.sk_state), &[self.state]);
        arena.put(sk(l.sk_shutdown), &[self.shutdown]);
        arena.put(sk(l.sk_flags), &self.flags.to_ne_bytes());
        arena.put(sk(l.sk_err), &self.err.to_ne_bytes());
        let socket = if self.detached { 0 } else { SOCKET_ADDR };
        arena.put(sk(l.sk_socket), &socket.to_ne_bytes());
        arena.put(sk(l.sk_bound_dev_if), &self.bound_dev_if.to_ne_bytes());
        arena.put(sk(l.sk_bound_dev_if) - 1, &[self.ipv6only_bits]);
        arena.put(sk(l.sk_route_caps), &self.route_caps.to_ne_bytes());
        arena.put(sk(l.sk_lingertime), &self.lingertime.to_ne_bytes());
        arena.put(sk(l.sk_frag_page), &self.frag_page.to_ne_bytes());
        let head = sk(l.sk_receive_queue);
        let next = if self.receive_queue_len > 0 { SKB_ADDR } else { head };
        arena.put(head, &next.to_ne_bytes());
        arena.put(head + 8, &next.to_ne_bytes());
        arena.put(head + 16, &self.receive_queue_len.to_ne_bytes());
        arena.put(sk(l.inet_rcv_tos) - 1, &[self.defer_connect_bits]);
        arena.put(sk(l.tcp_repair_queue) - 1, &[self.repair_bits]);
        arena.put(sk(l.tcp_repair_queue), &[self.repair_queue]);
        arena.put(sk(l.tcp_fastopen_req), &self.fastopen_req.to_ne_bytes());
        arena.put(sk(l.tcp_fastopen_rsk), &self.fastopen_rsk.to_ne_bytes());
        arena.put(sk(l.tcp_urg_data), &self.urg_data.to_ne_bytes());
        arena.put(sk(l.tcp_urg_seq), &self.urg_seq.to_ne_bytes());
        arena.put(sk(l.tcp_copied_seq), &self.copied_seq.to_ne_bytes());
        arena.put(sk(l.tcp_saved_syn), &self.saved_syn.to_ne_bytes());
        arena.put(sk(l.tcp_linger2), &self.linger2.to_ne_bytes());

        let so = |off: u32| SOCKET_ADDR + off as u64;
        arena.put(so(l.socket_state), &self.socket_state.to_ne_bytes());
        arena.put(so(l.socket_flags), &self.socket_flags.to_ne_bytes());
        arena.put(so(l.socket_sk), &SK_ADDR.to_ne_bytes());

        let msg = |off: u32| MSG_ADDR + off as u64;
        arena.put(msg(l.msg_controllen), &self.msg_controllen.to_ne_bytes());
        arena.put(msg(l.msg_iter_count), &self.msg_data_left.to_ne_bytes());
        arena.put(msg(l.msg_flags), &self.msg_flags.to_ne_bytes());
        arena
    }

    pub fn sock<'a>(&self, arena: &'a Arena) -> Sock<'a, Arena> {
        Sock::at(arena, &LAYOUT, SK_ADDR).expect("non-null")
    }

    pub fn socket<'a>(&self, arena: &'a Arena) -> Socket<'a, Arena> {
        Socket::at(arena, &LAYOUT, SOCKET_ADDR).expect("non-null")
    }

    pub fn msg<'a>(&self, arena: &'a Arena) -> MsgHdr<'a, Arena> {
        MsgHdr::at(arena, &LAYOUT, MSG_ADDR).expect("non-null")
    }
}
