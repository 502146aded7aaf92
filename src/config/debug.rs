//! Debugging feature flags.
//!
//! Toggle individual diagnostics here; keep them `false` by default so
//! release builds remain quiet.

pub struct DebugFlags {
    /// Emit engine queue / dispatch events (job queued, job done, triggers).
    pub print_engine_events: bool,
    /// Emit confluence cache hit/miss diagnostics with timings.
    pub print_confluence_cache_events: bool,
    /// Emit every accepted portfolio value observation, not just transitions.
    pub print_portfolio_observations: bool,
    /// Emit correlation matrix recompute summaries.
    pub print_correlation_recomputes: bool,
}

pub const DEBUG_FLAGS: DebugFlags = DebugFlags {
    print_engine_events: false,
    print_confluence_cache_events: false,
    print_portfolio_observations: false,
    print_correlation_recomputes: false,
};
