//! Service implementations over the request store.

mod lifecycle;
mod status;

pub use lifecycle::{
    hash_secret, CredentialReceipt, DecisionReceipt, LifecycleError, LifecycleOptions,
    LifecycleService, SubmitReceipt,
};
pub use status::{RequestView, StatusError, StatusService, StatusView};
