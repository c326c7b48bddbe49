use facegate_core::{
    AuthenticationOutcome, FaceDescriptor, FaceMatchService, GroupAuthResult, Identity,
    MatchError, MatchResult, SeededSimulator, SimilarityReport,
};
use facegate_store::{EnrollOutcome, IdentitySummary, SqliteStore, StoreError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Compare {
        a: FaceDescriptor,
        b: FaceDescriptor,
        reply: Reply<SimilarityReport>,
    },
    Authenticate {
        identity: Identity,
        probe: FaceDescriptor,
        threshold: Option<f32>,
        reply: Reply<AuthenticationOutcome>,
    },
    AuthenticateGroup {
        members: Vec<(Identity, FaceDescriptor)>,
        required_count: Option<usize>,
        reply: Reply<GroupAuthResult>,
    },
    Match {
        probe: FaceDescriptor,
        threshold: Option<f32>,
        reply: Reply<MatchResult>,
    },
    Register {
        display_name: String,
        handle: String,
        reply: Reply<Identity>,
    },
    Enroll {
        identity: Identity,
        descriptor: FaceDescriptor,
        reply: Reply<EnrollOutcome>,
    },
    ListIdentities {
        reply: Reply<Vec<IdentitySummary>>,
    },
    RemoveIdentity {
        identity: Identity,
        reply: Reply<bool>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(reply) => reply.map_err(|_| EngineError::ChannelClosed)?,
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
        }
    }

    pub async fn compare(
        &self,
        a: FaceDescriptor,
        b: FaceDescriptor,
    ) -> Result<SimilarityReport, EngineError> {
        self.call(|reply| EngineRequest::Compare { a, b, reply }).await
    }

    pub async fn authenticate(
        &self,
        identity: Identity,
        probe: FaceDescriptor,
        threshold: Option<f32>,
    ) -> Result<AuthenticationOutcome, EngineError> {
        self.call(|reply| EngineRequest::Authenticate {
            identity,
            probe,
            threshold,
            reply,
        })
        .await
    }

    pub async fn authenticate_group(
        &self,
        members: Vec<(Identity, FaceDescriptor)>,
        required_count: Option<usize>,
    ) -> Result<GroupAuthResult, EngineError> {
        self.call(|reply| EngineRequest::AuthenticateGroup {
            members,
            required_count,
            reply,
        })
        .await
    }

    pub async fn match_population(
        &self,
        probe: FaceDescriptor,
        threshold: Option<f32>,
    ) -> Result<MatchResult, EngineError> {
        self.call(|reply| EngineRequest::Match {
            probe,
            threshold,
            reply,
        })
        .await
    }

    pub async fn register(
        &self,
        display_name: String,
        handle: String,
    ) -> Result<Identity, EngineError> {
        self.call(|reply| EngineRequest::Register {
            display_name,
            handle,
            reply,
        })
        .await
    }

    pub async fn enroll(
        &self,
        identity: Identity,
        descriptor: FaceDescriptor,
    ) -> Result<EnrollOutcome, EngineError> {
        self.call(|reply| EngineRequest::Enroll {
            identity,
            descriptor,
            reply,
        })
        .await
    }

    pub async fn list_identities(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        self.call(|reply| EngineRequest::ListIdentities { reply }).await
    }

    pub async fn remove_identity(&self, identity: Identity) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::RemoveIdentity { identity, reply })
            .await
    }
}

/// Open the store and spawn the engine on a dedicated OS thread.
///
/// Fails fast at startup if the database cannot be opened.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let store = SqliteStore::open(&config.db_path)?;

    let simulator = match config.simulator_seed {
        Some(seed) => {
            tracing::info!(seed, "sub-model simulator seeded");
            SeededSimulator::seeded(seed)
        }
        None => SeededSimulator::from_entropy(),
    };
    let service = FaceMatchService::new(config.match_config(), simulator);

    spawn_with(
        store,
        service,
        Duration::from_secs(config.request_timeout_secs),
    )
}

/// Spawn the engine thread over an already-open store.
pub fn spawn_with(
    mut store: SqliteStore,
    mut service: FaceMatchService<SeededSimulator>,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut store, &mut service, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, timeout })
}

fn handle_request(
    store: &mut SqliteStore,
    service: &mut FaceMatchService<SeededSimulator>,
    req: EngineRequest,
) {
    // A dropped receiver means the caller timed out; the result is discarded.
    match req {
        EngineRequest::Compare { a, b, reply } => {
            let _ = reply.send(service.compare_two_descriptors(&a, &b).map_err(Into::into));
        }
        EngineRequest::Authenticate {
            identity,
            probe,
            threshold,
            reply,
        } => {
            let result = service.authenticate(&*store, &identity, &probe, threshold);
            let _ = reply.send(result.map_err(Into::into));
        }
        EngineRequest::AuthenticateGroup {
            members,
            required_count,
            reply,
        } => {
            let result = service.authenticate_group(&*store, &members, required_count);
            let _ = reply.send(result.map_err(Into::into));
        }
        EngineRequest::Match {
            probe,
            threshold,
            reply,
        } => {
            let result = service.match_against_population(&*store, &probe, threshold);
            let _ = reply.send(result.map_err(Into::into));
        }
        EngineRequest::Register {
            display_name,
            handle,
            reply,
        } => {
            let _ = reply.send(store.register_identity(&display_name, &handle).map_err(Into::into));
        }
        EngineRequest::Enroll {
            identity,
            descriptor,
            reply,
        } => {
            let result = match service.check_descriptor(&descriptor) {
                Ok(()) => store.enroll(&identity, &descriptor).map_err(Into::into),
                Err(e) => Err(e.into()),
            };
            let _ = reply.send(result);
        }
        EngineRequest::ListIdentities { reply } => {
            let _ = reply.send(store.list_identities().map_err(Into::into));
        }
        EngineRequest::RemoveIdentity { identity, reply } => {
            let _ = reply.send(store.remove_identity(&identity).map_err(Into::into));
        }
    }
}
