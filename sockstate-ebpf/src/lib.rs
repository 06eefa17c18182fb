#![no_std]

use aya_ebpf::{bpf_printk, helpers::bpf_probe_read_kernel};
use sockstate_common::{KernelRead, StateWord};

/// Kernel memory as seen from a probe.
pub struct ProbeRead;

impl KernelRead for ProbeRead {
    #[inline(always)]
    fn read_bytes<const N: usize>(&self, addr: u64) -> Option<[u8; N]> {
        if addr == 0 {
            return None;
        }
        unsafe { bpf_probe_read_kernel(addr as *const [u8; N]) }.ok()
    }
}

/// Writes `word` to the trace pipe as one lowercase hex line.
#[inline(always)]
pub fn emit(word: StateWord) {
    let bits: u64 = word.into();
    unsafe {
        bpf_printk!(c"%llx\n", bits);
    }
}
