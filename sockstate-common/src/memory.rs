//! Fallible access to kernel objects.
//!
//! Everything the encoders know about a socket comes through
//! [`KernelRead::read_bytes`]. A read that fails yields `None`, and the
//! encoders treat `None` as "field absent".

/// Reads raw kernel memory without faulting.
pub trait KernelRead {
    /// Copies `N` bytes starting at `addr`, or `None` if they cannot be read.
    fn read_bytes<const N: usize>(&self, addr: u64) -> Option<[u8; N]>;

    #[inline(always)]
    fn read_u8(&self, addr: u64) -> Option<u8> {
        self.read_bytes::<1>(addr).map(|b| b[0])
    }

    #[inline(always)]
    fn read_u16(&self, addr: u64) -> Option<u16> {
        self.read_bytes::<2>(addr).map(u16::from_ne_bytes)
    }

    #[inline(always)]
    fn read_u32(&self, addr: u64) -> Option<u32> {
        self.read_bytes::<4>(addr).map(u32::from_ne_bytes)
    }

    #[inline(always)]
    fn read_i32(&self, addr: u64) -> Option<i32> {
        self.read_bytes::<4>(addr).map(i32::from_ne_bytes)
    }

    #[inline(always)]
    fn read_u64(&self, addr: u64) -> Option<u64> {
        self.read_bytes::<8>(addr).map(u64::from_ne_bytes)
    }
}

/// Byte offsets of every kernel struct member the encoders sample.
///
/// Offsets vary between kernel builds, so the loader supplies them at run
/// time. `tcp_repair_queue`, `inet_rcv_tos` and `sk_bound_dev_if` double as
/// anchors: the bitfield byte right before each is read as well.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "user", serde(deny_unknown_fields))]
pub struct SockLayout {
    // struct sock
    pub sk_state: u32,
    pub sk_shutdown: u32,
    pub sk_flags: u32,
    pub sk_err: u32,
    pub sk_socket: u32,
    pub sk_bound_dev_if: u32,
    pub sk_route_caps: u32,
    pub sk_lingertime: u32,
    pub sk_frag_page: u32,
    pub sk_receive_queue: u32,
    // struct tcp_sock
    pub tcp_repair_queue: u32,
    pub tcp_fastopen_req: u32,
    pub tcp_fastopen_rsk: u32,
    pub tcp_urg_data: u32,
    pub tcp_urg_seq: u32,
    pub tcp_copied_seq: u32,
    pub tcp_saved_syn: u32,
    pub tcp_linger2: u32,
    // struct inet_sock
    pub inet_rcv_tos: u32,
    // struct socket
    pub socket_state: u32,
    pub socket_flags: u32,
    pub socket_sk: u32,
    // struct msghdr
    pub msg_controllen: u32,
    pub msg_iter_count: u32,
    pub msg_flags: u32,
}

impl SockLayout {
    /// Whether the loader has written this table. `sk_socket` is never at
    /// offset zero in a real `struct sock`.
    pub const fn is_loaded(&self) -> bool {
        self.sk_socket != 0
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SockLayout {}

/// A `struct sock` (and the `tcp_sock`/`inet_sock` it is embedded in).
pub struct Sock<'a, M> {
    mem: &'a M,
    layout: &'a SockLayout,
    addr: u64,
}

impl<'a, M: KernelRead> Sock<'a, M> {
    /// `None` for a null pointer.
    #[inline(always)]
    pub fn at(mem: &'a M, layout: &'a SockLayout, addr: u64) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        Some(Sock { mem, layout, addr })
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    #[inline(always)]
    fn field(&self, offset: u32) -> u64 {
        self.addr.wrapping_add(offset as u64)
    }

    /// The bitfield byte immediately preceding the member at `offset`.
    #[inline(always)]
    fn preceding_byte(&self, offset: u32) -> Option<u8> {
        self.mem.read_u8(self.field(offset).wrapping_sub(1))
    }

    pub fn state(&self) -> Option<u8> {
        self.mem.read_u8(self.field(self.layout.sk_state))
    }

    pub fn shutdown(&self) -> Option<u8> {
        self.mem.read_u8(self.field(self.layout.sk_shutdown))
    }

    pub fn flags(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.sk_flags))
    }

    pub fn err(&self) -> Option<i32> {
        self.mem.read_i32(self.field(self.layout.sk_err))
    }

    /// The owning `struct socket`, if attached and readable.
    pub fn socket(&self) -> Option<Socket<'a, M>> {
        let addr = self.mem.read_u64(self.field(self.layout.sk_socket))?;
        Socket::at(self.mem, self.layout, addr)
    }

    pub fn bound_dev_if(&self) -> Option<i32> {
        self.mem.read_i32(self.field(self.layout.sk_bound_dev_if))
    }

    /// Byte holding `ipv6only` among the `skc_*` bitfields.
    pub fn ipv6only_bits(&self) -> Option<u8> {
        self.preceding_byte(self.layout.sk_bound_dev_if)
    }

    pub fn route_caps(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.sk_route_caps))
    }

    pub fn lingertime(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.sk_lingertime))
    }

    pub fn frag_page(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.sk_frag_page))
    }

    /// Whether `sk_receive_queue` holds at least one skb.
    pub fn receive_queue_nonempty(&self) -> Option<bool> {
        let head = self.field(self.layout.sk_receive_queue);
        let next = self.mem.read_u64(head)?;
        Some(next != 0 && next != head)
    }

    /// Byte holding `nonagle` and `repair`.
    pub fn repair_bits(&self) -> Option<u8> {
        self.preceding_byte(self.layout.tcp_repair_queue)
    }

    pub fn repair_queue(&self) -> Option<u8> {
        self.mem.read_u8(self.field(self.layout.tcp_repair_queue))
    }

    pub fn fastopen_req(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.tcp_fastopen_req))
    }

    pub fn fastopen_rsk(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.tcp_fastopen_rsk))
    }

    pub fn urg_data(&self) -> Option<u16> {
        self.mem.read_u16(self.field(self.layout.tcp_urg_data))
    }

    pub fn urg_seq(&self) -> Option<u32> {
        self.mem.read_u32(self.field(self.layout.tcp_urg_seq))
    }

    pub fn copied_seq(&self) -> Option<u32> {
        self.mem.read_u32(self.field(self.layout.tcp_copied_seq))
    }

    pub fn saved_syn(&self) -> Option<u64> {
        self.mem.read_u64(self.field(self.layout.tcp_saved_syn))
    }

    pub fn linger2(&self) -> Option<i32> {
        self.mem.read_i32(self.field(self.layout.tcp_linger2))
    }

    /// Byte holding `defer_connect` among the `inet_sock` bitfields.
    pub fn defer_connect_bits(&self) -> Option<u8> {
        self.preceding_byte(self.layout.inet_rcv_tos)
    }
}

/// A `struct socket`.
pub struct Socket<'a, M> {
    mem: &'a M,
    layout: &'a SockLayout,
    addr: u64,
}

impl<'a, M: KernelRead> Socket<'a, M> {
    #[inline(always)]
    pub fn at(mem: &'a M, layout: &'a SockLayout, addr: u64) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        Some(Socket { mem, layout, addr })
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn state(&self) -> Option<u32> {
        self.mem
            .read_u32(self.addr.wrapping_add(self.layout.socket_state as u64))
    }

    pub fn flags(&self) -> Option<u64> {
        self.mem
            .read_u64(self.addr.wrapping_add(self.layout.socket_flags as u64))
    }

    pub fn sk(&self) -> Option<Sock<'a, M>> {
        let addr = self
            .mem
            .read_u64(self.addr.wrapping_add(self.layout.socket_sk as u64))?;
        Sock::at(self.mem, self.layout, addr)
    }
}

/// A `struct msghdr`.
pub struct MsgHdr<'a, M> {
    mem: &'a M,
    layout: &'a SockLayout,
    addr: u64,
}

impl<'a, M: KernelRead> MsgHdr<'a, M> {
    #[inline(always)]
    pub fn at(mem: &'a M, layout: &'a SockLayout, addr: u64) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        Some(MsgHdr { mem, layout, addr })
    }

    pub fn controllen(&self) -> Option<u64> {
        self.mem
            .read_u64(self.addr.wrapping_add(self.layout.msg_controllen as u64))
    }

    /// `msg_iter.count`, the bytes still to transfer.
    pub fn data_left(&self) -> Option<u64> {
        self.mem
            .read_u64(self.addr.wrapping_add(self.layout.msg_iter_count as u64))
    }

    pub fn flags(&self) -> Option<u32> {
        self.mem
            .read_u32(self.addr.wrapping_add(self.layout.msg_flags as u64))
    }
}
