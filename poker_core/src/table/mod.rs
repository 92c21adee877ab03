//! Cash/lobby tables: the per-table hand engine, its wire types, and the
//! table directory.

pub mod manager;
pub mod messages;
pub mod session;

pub use manager::TableManager;
pub use messages::{
    ActionCommand, ActionPayload, ClientMessage, PlayerSnapshot, ServerMessage, Stage,
    TableSnapshot,
};
pub use session::{PotContribution, TableConfig, TableSession, build_side_pots};
