pub mod binder;
pub mod decision;
pub mod engine;
pub mod gate;
pub mod ledger;
pub mod pending;

pub use binder::{hooks_for, Hook, HookAction, HookTrigger, OrderLifecycleBinder};
pub use decision::{
    decide_entry, plan_time_exit, protective_stop, EntryBranch, EntryDecision, ExitPlan,
    Thresholds,
};
pub use engine::{CycleReport, DecisionEngine};
pub use gate::{Gate, GateLatch, GateSchedule};
pub use ledger::{ActiveTrade, ActiveTradeLedger, LedgerChanged};
pub use pending::PendingEntries;
