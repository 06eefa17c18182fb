#![cfg_attr(not(test), no_std)]

pub mod catalog;
pub mod entry;
pub mod kernel;
pub mod memory;
pub mod ret;
pub mod word;

#[cfg(test)]
mod testing;

pub use catalog::{probe_points, ret_probe_points, FunctionId};
pub use memory::{KernelRead, MsgHdr, Sock, SockLayout, Socket};
pub use word::{apply_mask, Discriminant, StateWord};

/// Key of the per-thread stash an entry probe leaves for its exit probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct PendingKey {
    pub pid_tgid: u64,
    pub id: u8,
    pub _pad: [u8; 7],
}

impl PendingKey {
    pub const fn new(pid_tgid: u64, id: FunctionId) -> Self {
        PendingKey {
            pid_tgid,
            id: id.id(),
            _pad: [0; 7],
        }
    }
}

/// The kernel object an entry probe saw, resolved to a `struct sock` on exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Pending {
    pub addr: u64,
    /// `addr` is a `struct socket *` rather than a `struct sock *`.
    pub is_socket: u8,
    pub _pad: [u8; 7],
}

impl Pending {
    pub const fn sock(addr: u64) -> Self {
        Pending {
            addr,
            is_socket: 0,
            _pad: [0; 7],
        }
    }

    pub const fn socket(addr: u64) -> Self {
        Pending {
            addr,
            is_socket: 1,
            _pad: [0; 7],
        }
    }

    /// The object behind the first argument of `id`.
    pub const fn of(id: FunctionId, addr: u64) -> Self {
        if id.takes_socket() {
            Pending::socket(addr)
        } else {
            Pending::sock(addr)
        }
    }

    /// Resolves the stashed pointer to the `struct sock` to sample.
    pub fn resolve<'a, M: KernelRead>(
        &self,
        mem: &'a M,
        layout: &'a SockLayout,
    ) -> Option<Sock<'a, M>> {
        if self.is_socket != 0 {
            Socket::at(mem, layout, self.addr)?.sk()
        } else {
            Sock::at(mem, layout, self.addr)
        }
    }
}
