//! Which program goes on which kernel function.

use std::fmt;

use sockstate_common::{probe_points, ret_probe_points};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    Entry,
    Return,
}

impl ProbeKind {
    fn prefix(self) -> &'static str {
        match self {
            ProbeKind::Entry => "kprobe",
            ProbeKind::Return => "kretprobe",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One program to load and attach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub program: String,
    pub symbol: &'static str,
    pub kind: ProbeKind,
}

impl Attachment {
    fn new(symbol: &'static str, kind: ProbeKind) -> Self {
        Attachment {
            program: format!("{}_{}", kind.prefix(), symbol),
            symbol,
            kind,
        }
    }
}

/// Every entry probe in catalog order, followed by every return probe.
pub fn plan() -> Vec<Attachment> {
    let entries = probe_points()
        .iter()
        .map(|symbol| Attachment::new(symbol, ProbeKind::Entry));
    let returns = ret_probe_points()
        .iter()
        .map(|symbol| Attachment::new(symbol, ProbeKind::Return));
    entries.chain(returns).collect()
}
