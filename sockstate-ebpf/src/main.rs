#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::bpf_get_current_pid_tgid,
    macros::{kprobe, kretprobe, map},
    maps::{Array, LruHashMap},
    programs::{ProbeContext, RetProbeContext},
    EbpfContext,
};
use aya_log_ebpf::{error, warn};
use sockstate_common::{
    entry, ret, FunctionId, MsgHdr, Pending, PendingKey, Sock, SockLayout, Socket, StateWord,
};
use sockstate_ebpf::{emit, ProbeRead};

// Filled by the loader before any probe is attached.
#[map]
static LAYOUT: Array<SockLayout> = Array::with_max_entries(1, 0);

// value: the object the entry probe saw, keyed by thread and function
#[map]
static PENDING: LruHashMap<PendingKey, Pending> = LruHashMap::with_max_entries(1 << 14, 0);

#[inline(always)]
fn layout<C: EbpfContext>(ctx: &C) -> Result<&'static SockLayout, i64> {
    match LAYOUT.get(0) {
        Some(layout) if layout.is_loaded() => Ok(layout),
        _ => {
            error!(ctx, "struct layout not loaded");
            Err(-1)
        }
    }
}

#[inline(always)]
fn arg(ctx: &ProbeContext, n: usize) -> Result<u64, i64> {
    ctx.arg::<u64>(n).ok_or(-1)
}

#[inline(always)]
fn stash(ctx: &ProbeContext, id: FunctionId, pending: Pending) {
    let key = PendingKey::new(bpf_get_current_pid_tgid(), id);
    if let Err(errno) = PENDING.insert(&key, &pending, 0) {
        warn!(ctx, "stash for function {} failed, error {}", id.id(), errno);
    }
}

/// Emits `word` and remembers the object argument for the exit probe.
#[inline(always)]
fn enter(ctx: &ProbeContext, id: FunctionId, word: StateWord) -> Result<u32, i64> {
    let addr = arg(ctx, 0)?;
    emit(word);
    stash(ctx, id, Pending::of(id, addr));
    Ok(0)
}

macro_rules! entry_probe {
    ($name:ident, $try_name:ident) => {
        #[kprobe]
        pub fn $name(ctx: ProbeContext) -> u32 {
            match $try_name(&ctx) {
                Ok(ret) => ret,
                Err(_) => 0,
            }
        }
    };
}

entry_probe!(kprobe_tcp_v6_init_sock, try_tcp_v6_init_sock);
entry_probe!(kprobe_tcp_v6_connect, try_tcp_v6_connect);
entry_probe!(kprobe_tcp_sendmsg, try_tcp_sendmsg);
entry_probe!(kprobe_tcp_recvmsg, try_tcp_recvmsg);
entry_probe!(kprobe_tcp_close, try_tcp_close);
entry_probe!(kprobe_tcp_shutdown, try_tcp_shutdown);
entry_probe!(kprobe_tcp_setsockopt, try_tcp_setsockopt);
entry_probe!(kprobe_tcp_getsockopt, try_tcp_getsockopt);
entry_probe!(kprobe_inet_accept, try_inet_accept);
entry_probe!(kprobe_inet_listen, try_inet_listen);
entry_probe!(kprobe_tcp_ioctl, try_tcp_ioctl);
entry_probe!(kprobe_inet6_bind, try_inet6_bind);
entry_probe!(kprobe_inet6_ioctl, try_inet6_ioctl);
entry_probe!(kprobe_inet6_getname, try_inet6_getname);

fn try_tcp_v6_init_sock(ctx: &ProbeContext) -> Result<u32, i64> {
    enter(ctx, FunctionId::TcpV6InitSock, entry::tcp_v6_init_sock())
}

fn try_tcp_v6_connect(ctx: &ProbeContext) -> Result<u32, i64> {
    enter(ctx, FunctionId::TcpV6Connect, entry::tcp_v6_connect())
}

// tcp_sendmsg(struct sock *sk, struct msghdr *msg, size_t size)
fn try_tcp_sendmsg(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    let msg = MsgHdr::at(&ProbeRead, layout, arg(ctx, 1)?).ok_or(-1)?;
    enter(ctx, FunctionId::TcpSendmsg, entry::tcp_sendmsg(&sk, &msg))
}

// tcp_recvmsg(struct sock *sk, struct msghdr *msg, size_t len, int flags, ...)
fn try_tcp_recvmsg(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    let msg = MsgHdr::at(&ProbeRead, layout, arg(ctx, 1)?).ok_or(-1)?;
    enter(ctx, FunctionId::TcpRecvmsg, entry::tcp_recvmsg(&sk, &msg))
}

fn try_tcp_close(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    enter(ctx, FunctionId::TcpClose, entry::tcp_close(&sk))
}

// tcp_shutdown(struct sock *sk, int how)
fn try_tcp_shutdown(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    let how = arg(ctx, 1)? as i32;
    enter(ctx, FunctionId::TcpShutdown, entry::tcp_shutdown(&sk, how))
}

fn try_tcp_setsockopt(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    enter(ctx, FunctionId::TcpSetsockopt, entry::tcp_setsockopt(&sk))
}

fn try_tcp_getsockopt(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sk = Sock::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    enter(ctx, FunctionId::TcpGetsockopt, entry::tcp_getsockopt(&sk))
}

// inet_accept(struct socket *sock, struct socket *newsock, int flags, bool kern)
fn try_inet_accept(ctx: &ProbeContext) -> Result<u32, i64> {
    let sock = arg(ctx, 0)?;
    let newsock = arg(ctx, 1)?;
    let kern = arg(ctx, 3)? as u8 != 0;
    for word in entry::inet_accept(kern) {
        emit(word);
    }
    for (id, addr) in [
        (FunctionId::InetAcceptListener, sock),
        (FunctionId::InetAcceptNew, newsock),
    ] {
        stash(ctx, id, Pending::of(id, addr));
    }
    Ok(0)
}

fn try_inet_listen(ctx: &ProbeContext) -> Result<u32, i64> {
    let layout = layout(ctx)?;
    let sock = Socket::at(&ProbeRead, layout, arg(ctx, 0)?).ok_or(-1)?;
    enter(ctx, FunctionId::InetListen, entry::inet_listen(&sock))
}

// tcp_ioctl(struct sock *sk, int cmd, int *karg)
fn try_tcp_ioctl(ctx: &ProbeContext) -> Result<u32, i64> {
    let cmd = arg(ctx, 1)? as u32;
    enter(ctx, FunctionId::TcpIoctl, entry::tcp_ioctl(cmd))
}

fn try_inet6_bind(ctx: &ProbeContext) -> Result<u32, i64> {
    enter(ctx, FunctionId::Inet6Bind, entry::inet6_bind())
}

// inet6_ioctl(struct socket *sock, unsigned int cmd, unsigned long arg)
fn try_inet6_ioctl(ctx: &ProbeContext) -> Result<u32, i64> {
    let cmd = arg(ctx, 1)? as u32;
    enter(ctx, FunctionId::Inet6Ioctl, entry::inet6_ioctl(cmd))
}

// inet6_getname(struct socket *sock, struct sockaddr *uaddr, int peer)
fn try_inet6_getname(ctx: &ProbeContext) -> Result<u32, i64> {
    let peer = arg(ctx, 2)? as i32;
    enter(ctx, FunctionId::Inet6Getname, entry::inet6_getname(peer))
}

/// Takes the object stashed by the matching entry probe and samples it.
#[inline(always)]
fn try_exit(ctx: &RetProbeContext, id: FunctionId) -> Result<u32, i64> {
    let key = PendingKey::new(bpf_get_current_pid_tgid(), id);
    let pending = match unsafe { PENDING.get(&key) } {
        Some(pending) => *pending,
        None => return Ok(0),
    };
    if let Err(errno) = PENDING.remove(&key) {
        warn!(ctx, "unable to drop stash for function {}, error {}", id.id(), errno);
    }

    let layout = layout(ctx)?;
    if let Some(sk) = pending.resolve(&ProbeRead, layout) {
        emit(ret::return_state(&sk));
    }
    Ok(0)
}

macro_rules! exit_probe {
    ($name:ident, $($id:ident),+) => {
        #[kretprobe]
        pub fn $name(ctx: RetProbeContext) -> u32 {
            $(
                let _ = try_exit(&ctx, FunctionId::$id);
            )+
            0
        }
    };
}

exit_probe!(kretprobe_tcp_v6_init_sock, TcpV6InitSock);
exit_probe!(kretprobe_tcp_v6_connect, TcpV6Connect);
exit_probe!(kretprobe_tcp_sendmsg, TcpSendmsg);
exit_probe!(kretprobe_tcp_recvmsg, TcpRecvmsg);
exit_probe!(kretprobe_tcp_close, TcpClose);
exit_probe!(kretprobe_tcp_shutdown, TcpShutdown);
exit_probe!(kretprobe_tcp_setsockopt, TcpSetsockopt);
exit_probe!(kretprobe_tcp_getsockopt, TcpGetsockopt);
exit_probe!(kretprobe_inet_accept, InetAcceptListener, InetAcceptNew);
exit_probe!(kretprobe_inet_listen, InetListen);
exit_probe!(kretprobe_tcp_ioctl, TcpIoctl);
exit_probe!(kretprobe_inet6_bind, Inet6Bind);
exit_probe!(kretprobe_inet6_ioctl, Inet6Ioctl);
exit_probe!(kretprobe_inet6_getname, Inet6Getname);

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}

#[no_mangle]
#[link_section = "license"]
pub static LICENSE: [u8; 4] = *b"GPL\0";
