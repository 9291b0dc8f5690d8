//! Rent2Repay Protocol Constants

/// Maximum number of tokens in one configuration
pub const MAX_TOKENS: usize = 4;

/// Repayment periodicity presets
pub mod periods {
    /// Gnosis Chain block time; shorter periods cannot be honoured
    pub const MIN_PERIOD_SECS: u64 = 5;

    pub const HOUR: u64 = 3_600;
    pub const DAY: u64 = 86_400;
    pub const WEEK: u64 = 604_800;
    pub const MONTH: u64 = 2_592_000;

    /// A selectable period
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PeriodPreset {
        pub label: &'static str,
        pub seconds: u64,
    }

    pub const PRESETS: [PeriodPreset; 5] = [
        PeriodPreset {
            label: "5 seconds",
            seconds: MIN_PERIOD_SECS,
        },
        PeriodPreset {
            label: "1 hour",
            seconds: HOUR,
        },
        PeriodPreset {
            label: "1 day",
            seconds: DAY,
        },
        PeriodPreset {
            label: "1 week",
            seconds: WEEK,
        },
        PeriodPreset {
            label: "30 days",
            seconds: MONTH,
        },
    ];

    pub fn is_preset(seconds: u64) -> bool {
        PRESETS.iter().any(|p| p.seconds == seconds)
    }
}

/// Fee arithmetic constants
pub mod fees {
    /// Basis points in 100%
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Fixed-point base of on-chain interest rates
    pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;
}

/// Access-control role names hashed with keccak256 on-chain
pub mod roles {
    pub const ADMIN_ROLE: &str = "ADMIN_ROLE";
    pub const OPERATOR_ROLE: &str = "OPERATOR_ROLE";
    pub const EMERGENCY_ROLE: &str = "EMERGENCY_ROLE";
}

/// Fallbacks for tokens missing from the catalog
pub mod tokens {
    pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";
    pub const DEFAULT_DECIMALS: u8 = 18;
}
