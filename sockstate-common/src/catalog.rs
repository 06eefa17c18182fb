//! Monitored kernel functions and their positional ids.

/// Identifies which probe point produced an entry word.
///
/// Ids are positional in [`PROBE_POINTS`]; `inet_accept` takes two
/// consecutive ids, one per socket it samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionId {
    TcpV6InitSock = 0x0,
    TcpV6Connect = 0x1,
    TcpSendmsg = 0x2,
    TcpRecvmsg = 0x3,
    TcpClose = 0x4,
    TcpShutdown = 0x5,
    TcpSetsockopt = 0x6,
    TcpGetsockopt = 0x7,
    InetAcceptListener = 0x8,
    InetAcceptNew = 0x9,
    InetListen = 0xa,
    TcpIoctl = 0xb,
    Inet6Bind = 0xc,
    Inet6Ioctl = 0xd,
    Inet6Getname = 0xe,
}

impl FunctionId {
    pub const ALL: [FunctionId; 15] = [
        FunctionId::TcpV6InitSock,
        FunctionId::TcpV6Connect,
        FunctionId::TcpSendmsg,
        FunctionId::TcpRecvmsg,
        FunctionId::TcpClose,
        FunctionId::TcpShutdown,
        FunctionId::TcpSetsockopt,
        FunctionId::TcpGetsockopt,
        FunctionId::InetAcceptListener,
        FunctionId::InetAcceptNew,
        FunctionId::InetListen,
        FunctionId::TcpIoctl,
        FunctionId::Inet6Bind,
        FunctionId::Inet6Ioctl,
        FunctionId::Inet6Getname,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Kernel symbol this id is attached to.
    pub const fn symbol(self) -> &'static str {
        match self {
            FunctionId::TcpV6InitSock => "tcp_v6_init_sock",
            FunctionId::TcpV6Connect => "tcp_v6_connect",
            FunctionId::TcpSendmsg => "tcp_sendmsg",
            FunctionId::TcpRecvmsg => "tcp_recvmsg",
            FunctionId::TcpClose => "tcp_close",
            FunctionId::TcpShutdown => "tcp_shutdown",
            FunctionId::TcpSetsockopt => "tcp_setsockopt",
            FunctionId::TcpGetsockopt => "tcp_getsockopt",
            FunctionId::InetAcceptListener | FunctionId::InetAcceptNew => "inet_accept",
            FunctionId::InetListen => "inet_listen",
            FunctionId::TcpIoctl => "tcp_ioctl",
            FunctionId::Inet6Bind => "inet6_bind",
            FunctionId::Inet6Ioctl => "inet6_ioctl",
            FunctionId::Inet6Getname => "inet6_getname",
        }
    }

    /// Whether the probed function's object argument is a `struct socket`
    /// rather than a `struct sock`.
    pub const fn takes_socket(self) -> bool {
        matches!(
            self,
            FunctionId::InetAcceptListener
                | FunctionId::InetAcceptNew
                | FunctionId::InetListen
                | FunctionId::Inet6Bind
                | FunctionId::Inet6Ioctl
                | FunctionId::Inet6Getname
        )
    }
}

/// Functions receiving an entry probe, in id order.
pub const PROBE_POINTS: [&str; 14] = [
    "tcp_v6_init_sock",
    "tcp_v6_connect",
    "tcp_sendmsg",
    "tcp_recvmsg",
    "tcp_close",
    "tcp_shutdown",
    "tcp_setsockopt",
    "tcp_getsockopt",
    "inet_accept",
    "inet_listen",
    "tcp_ioctl",
    "inet6_bind",
    "inet6_ioctl",
    "inet6_getname",
];

/// Functions receiving a return probe. Lock-step with [`PROBE_POINTS`].
pub const RET_PROBE_POINTS: [&str; 14] = PROBE_POINTS;

pub fn probe_points() -> &'static [&'static str] {
    &PROBE_POINTS
}

pub fn ret_probe_points() -> &'static [&'static str] {
    &RET_PROBE_POINTS
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

// Walking the ids in order must visit the catalog in order.
const _: () = {
    let mut point = 0;
    let mut i = 0;
    while i < FunctionId::ALL.len() {
        let id = FunctionId::ALL[i];
        assert!(id as usize == i);
        if !str_eq(id.symbol(), PROBE_POINTS[point]) {
            point += 1;
            assert!(str_eq(id.symbol(), PROBE_POINTS[point]));
        }
        i += 1;
    }
    assert!(point == PROBE_POINTS.len() - 1);
};
