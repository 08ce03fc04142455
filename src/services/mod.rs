//! Business logic services.
//!
//! Services contain the payment lifecycle logic separated from HTTP
//! handlers. They operate purely on the injected collaborator traits
//! (ledger, processor client, notification dispatcher), so each can be
//! exercised with mocks.

pub mod intake;
pub mod provisioning;
pub mod reconcile;
