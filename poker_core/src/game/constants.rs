//! Game-wide constants.

use std::time::Duration;

/// Hard ceiling on seats at a single table. Some modes cap lower (6-max).
pub const MAX_PLAYERS: usize = 9;

/// Cash-table small blind.
pub const SMALL_BLIND: u32 = 10;

/// Cash-table big blind.
pub const BIG_BLIND: u32 = 20;

/// Stack granted on buy-in and on rebuy.
pub const START_BALANCE: u32 = 1000;

/// How long the active player has to act before being auto-folded.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between the end of a betting round and the next street.
pub const BETTING_ROUND_DELAY: Duration = Duration::from_millis(1500);

/// Pause after a showdown before the next hand starts.
pub const SHOWDOWN_DELAY: Duration = Duration::from_millis(5000);

/// How long a busted player keeps their seat before removal.
pub const BUSTOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// How many trailing event-log entries are projected to clients.
pub const EVENT_LOG_WINDOW: usize = 30;
