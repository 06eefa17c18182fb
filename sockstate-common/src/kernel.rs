//! Kernel constants the encoders filter on.
//!
//! Values follow `include/net/tcp_states.h`, `include/net/sock.h`,
//! `include/linux/socket.h` and `include/uapi/linux/sockios.h`.

// enum tcp_state
pub const TCP_ESTABLISHED: u8 = 1;
pub const TCP_SYN_SENT: u8 = 2;
pub const TCP_SYN_RECV: u8 = 3;
pub const TCP_FIN_WAIT1: u8 = 4;
pub const TCP_FIN_WAIT2: u8 = 5;
pub const TCP_TIME_WAIT: u8 = 6;
pub const TCP_CLOSE: u8 = 7;
pub const TCP_CLOSE_WAIT: u8 = 8;
pub const TCP_LAST_ACK: u8 = 9;
pub const TCP_LISTEN: u8 = 10;
pub const TCP_CLOSING: u8 = 11;

/// `TCPF_*` bit for a `TCP_*` state.
pub const fn tcpf(state: u8) -> u32 {
    1 << state
}

// sk_shutdown
pub const RCV_SHUTDOWN: u8 = 1;
pub const SEND_SHUTDOWN: u8 = 2;
pub const SHUTDOWN_MASK: u8 = 3;

// enum sock_flags
pub const SOCK_DEAD: u8 = 0;
pub const SOCK_DONE: u8 = 1;
pub const SOCK_URGINLINE: u8 = 2;
pub const SOCK_KEEPOPEN: u8 = 3;
pub const SOCK_LINGER: u8 = 4;
pub const SOCK_ZEROCOPY: u8 = 18;

// msg_flags
pub const MSG_OOB: u32 = 0x1;
pub const MSG_PEEK: u32 = 0x2;
pub const MSG_TRUNC: u32 = 0x20;
pub const MSG_WAITALL: u32 = 0x100;
pub const MSG_ERRQUEUE: u32 = 0x2000;

// asm-generic ioctls and sockios
pub const FIONREAD: u32 = 0x541b;
pub const TIOCOUTQ: u32 = 0x5411;
pub const SIOCINQ: u32 = FIONREAD;
pub const SIOCOUTQ: u32 = TIOCOUTQ;
pub const SIOCATMARK: u32 = 0x8905;
pub const SIOCOUTQNSD: u32 = 0x894b;

// netdev_features_t, NETIF_F_SG_BIT
pub const NETIF_F_SG: u64 = 1 << 0;

/// tp->urg_data marker for urgent data still to be read.
pub const TCP_URG_VALID: u16 = 0x0100;
