//! One connection, start to finish
//!
//! [`run`] sets a connection up, hands a client to the caller and always
//! tears the connection down again. A failed teardown never hides the call
//! error that preceded it: both end up in [`SessionError::Teardown`].

use log::{debug, warn};
use thiserror::Error;

use crate::config::SetupOptions;
use crate::id::{IdSource, RandomIds};
use crate::transport::{ConnectionError, ConnectionManager};
use crate::{RpcClient, RpcError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("setup: {0}")]
    Setup(#[source] ConnectionError),
    #[error("call: {0}")]
    Call(#[source] RpcError),
    #[error("teardown: {source}{}", after_call(.prior))]
    Teardown {
        #[source]
        source: ConnectionError,
        /// Call failure that happened before the teardown failed
        prior: Option<RpcError>,
    },
}

fn after_call(prior: &Option<RpcError>) -> String {
    match prior {
        Some(err) => format!(" (after call failure: {err})"),
        None => String::new(),
    }
}

impl SessionError {
    /// The call failure, whether or not teardown failed as well
    pub fn call_error(&self) -> Option<&RpcError> {
        match self {
            SessionError::Call(err) => Some(err),
            SessionError::Teardown { prior, .. } => prior.as_ref(),
            SessionError::Setup(_) => None,
        }
    }

    pub fn teardown_error(&self) -> Option<&ConnectionError> {
        match self {
            SessionError::Teardown { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Set up a connection, run `f` against a client, tear down
pub fn run<M, T, F>(manager: &mut M, options: &SetupOptions, f: F) -> Result<T, SessionError>
where
    M: ConnectionManager,
    F: FnOnce(&mut RpcClient<M::Characteristic>) -> Result<T, RpcError>,
{
    run_with_ids(manager, options, RandomIds::new(), f)
}

/// [`run`] with an explicit id source
pub fn run_with_ids<M, I, T, F>(
    manager: &mut M,
    options: &SetupOptions,
    ids: I,
    f: F,
) -> Result<T, SessionError>
where
    M: ConnectionManager,
    I: IdSource,
    F: FnOnce(&mut RpcClient<M::Characteristic, I>) -> Result<T, RpcError>,
{
    let connection = manager.setup(options).map_err(SessionError::Setup)?;
    debug!("connected to {}", options.address);

    let mut client = RpcClient::with_ids(connection, ids);
    let outcome = f(&mut client);

    match (manager.teardown(client.into_connection()), outcome) {
        (Ok(()), Ok(value)) => Ok(value),
        (Ok(()), Err(err)) => Err(SessionError::Call(err)),
        (Err(source), outcome) => {
            warn!("teardown of {} failed: {}", options.address, source);
            Err(SessionError::Teardown {
                source,
                prior: outcome.err(),
            })
        }
    }
}
