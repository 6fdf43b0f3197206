//! Protocol layer of the oxapi framework.
//!
//! This crate owns everything that touches the wire: the HTTP/1.1 codec
//! ([`codec`]), the per-connection worker loop ([`connection`]), the core
//! request/response vocabulary ([`protocol`]) and the [`handler::Handler`]
//! seam the framework layer plugs into.

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod spool;

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
