mod identity;
mod shutdown;

pub mod prelude {
    pub use crate::identity::RunIdentity;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
