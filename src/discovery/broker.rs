use futures::channel::mpsc::{channel, Sender};
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::discovery::types::CandidateDevice;
use crate::error::DiscoveryError;

/// Holds the candidates of the current discovery round and the callback of the chooser that is
/// waiting for a selection.
///
/// There is at most one pending callback. Opening a new chooser abandons the previous one: its
/// receiver observes a cancellation and the callback is never invoked.
#[derive(Debug, Default)]
pub struct Broker {
    candidates: IndexMap<String, CandidateDevice>,
    pending: Option<oneshot::Sender<CandidateDevice>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new discovery round.
    pub fn open_chooser(&mut self) -> oneshot::Receiver<CandidateDevice> {
        let (callback, receiver) = oneshot::channel();

        if self.pending.replace(callback).is_some() {
            info!("Replacing pending device chooser");
        }
        self.candidates.clear();

        receiver
    }

    pub fn has_pending_chooser(&self) -> bool {
        self.pending.is_some()
    }

    /// Records a discovered device. A record with the same id is overwritten.
    pub fn register_candidate(&mut self, candidate: CandidateDevice) {
        if !self.candidates.contains_key(&candidate.id) {
            debug!("New candidate {} ({})", candidate.name, candidate.id);
        }
        self.candidates.insert(candidate.id.clone(), candidate);
    }

    pub fn list_candidates(&self) -> Vec<CandidateDevice> {
        self.candidates.values().cloned().collect()
    }

    /// Resolves the pending chooser with the candidate matching `id`.
    ///
    /// Fails without side effects if no chooser is pending or `id` is unknown.
    pub fn resolve(&mut self, id: &str) -> Result<(), DiscoveryError> {
        if self.pending.is_none() {
            return Err(DiscoveryError::NoPendingChooser);
        }

        let candidate = self.candidates.get(id)
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownCandidate { id: id.to_string() })?;

        if let Some(callback) = self.pending.take() {
            info!("Resolving device chooser with {} ({})", candidate.name, candidate.id);

            if callback.send(candidate).is_err() {
                warn!("The device chooser is no longer waiting for a selection");
            }
        }
        self.candidates.clear();

        Ok(())
    }
}

enum BrokerRequest {
    PullDevices {
        reply: oneshot::Sender<Vec<CandidateDevice>>,
    },
    SelectDevice {
        id: String,
        reply: oneshot::Sender<Result<(), DiscoveryError>>,
    },
    OpenChooser {
        reply: oneshot::Sender<oneshot::Receiver<CandidateDevice>>,
    },
    RegisterCandidate(CandidateDevice),
}

/// Cloneable handle to a running broker task. This is the only way other tasks reach the broker.
#[derive(Clone)]
pub struct BrokerHandle {
    sender: Sender<BrokerRequest>,
}

impl BrokerHandle {
    async fn request<T>(
        &self,
        make_request: impl FnOnce(oneshot::Sender<T>) -> BrokerRequest,
    ) -> Result<T, DiscoveryError> {
        let (reply, response) = oneshot::channel();
        let mut sender = self.sender.clone();

        sender.send(make_request(reply)).await
            .map_err(|_| DiscoveryError::BrokerUnavailable)?;

        response.await.map_err(|_| DiscoveryError::BrokerUnavailable)
    }

    /// Returns the candidates of the current discovery round, in no particular order.
    pub async fn pull_devices(&self) -> Result<Vec<CandidateDevice>, DiscoveryError> {
        self.request(|reply| BrokerRequest::PullDevices { reply }).await
    }

    /// Resolves the pending chooser with the candidate matching `id`.
    pub async fn select_device(&self, id: &str) -> Result<(), DiscoveryError> {
        let id = id.to_string();
        self.request(|reply| BrokerRequest::SelectDevice { id, reply }).await?
    }

    /// Installs a new pending chooser. The receiver yields the selected candidate.
    pub async fn open_chooser(&self) -> Result<oneshot::Receiver<CandidateDevice>, DiscoveryError> {
        self.request(|reply| BrokerRequest::OpenChooser { reply }).await
    }

    pub async fn register_candidate(&self, candidate: CandidateDevice) -> Result<(), DiscoveryError> {
        let mut sender = self.sender.clone();
        sender.send(BrokerRequest::RegisterCandidate(candidate)).await
            .map_err(|_| DiscoveryError::BrokerUnavailable)
    }
}

pub fn broker_task(cancel: CancellationToken) -> (BrokerHandle, JoinHandle<()>) {
    let (sender, mut receiver) = channel::<BrokerRequest>(64);

    let handle = spawn(async move {
        let mut broker = Broker::new();

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                request = receiver.next() => {
                    let Some(request) = request else {
                        break 'mainloop;
                    };

                    match request {
                        BrokerRequest::PullDevices { reply } => {
                            let _ = reply.send(broker.list_candidates());
                        },
                        BrokerRequest::SelectDevice { id, reply } => {
                            let result = broker.resolve(&id);
                            if let Err(err) = &result {
                                error!("Device chooser misuse: {}", err);
                            }
                            let _ = reply.send(result);
                        },
                        BrokerRequest::OpenChooser { reply } => {
                            let _ = reply.send(broker.open_chooser());
                        },
                        BrokerRequest::RegisterCandidate(candidate) => {
                            broker.register_candidate(candidate);
                        },
                    }
                },
            }
        }

        debug!("Broker task stopped");
    });

    (BrokerHandle { sender }, handle)
}
