//! Semantic subscription kinds and their wire parameters.

/// The four streams the feed offers.
///
/// The speculative variants deliver blocks before consensus finality,
/// carrying a commit-state progression; the standard variants deliver
/// already-final notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    StandardHeads,
    SpeculativeHeads,
    StandardLogs,
    SpeculativeLogs,
}

impl SubscriptionKind {
    /// All kinds, in menu order.
    pub const ALL: [SubscriptionKind; 4] = [
        Self::StandardHeads,
        Self::SpeculativeHeads,
        Self::StandardLogs,
        Self::SpeculativeLogs,
    ];

    /// The `eth_subscribe` parameter selecting this stream.
    pub fn param(self) -> &'static str {
        match self {
            Self::StandardHeads => "newHeads",
            Self::SpeculativeHeads => "monadNewHeads",
            Self::StandardLogs => "logs",
            Self::SpeculativeLogs => "monadLogs",
        }
    }

    /// Parse a wire parameter back into a kind.
    pub fn from_param(param: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.param() == param)
    }

    /// Block-header streams.
    pub fn is_heads(self) -> bool {
        matches!(self, Self::StandardHeads | Self::SpeculativeHeads)
    }

    /// Event-log streams.
    pub fn is_logs(self) -> bool {
        !self.is_heads()
    }
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StandardHeads => write!(f, "Standard newHeads"),
            Self::SpeculativeHeads => write!(f, "Monad newHeads"),
            Self::StandardLogs => write!(f, "Standard logs"),
            Self::SpeculativeLogs => write!(f, "Monad logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_round_trip() {
        for kind in SubscriptionKind::ALL {
            assert_eq!(SubscriptionKind::from_param(kind.param()), Some(kind));
        }
        assert_eq!(SubscriptionKind::from_param("pendingTransactions"), None);
    }

    #[test]
    fn heads_and_logs_partition() {
        for kind in SubscriptionKind::ALL {
            assert_ne!(kind.is_heads(), kind.is_logs());
        }
    }
}
