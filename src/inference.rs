//! Shared inference channel and the batching wrapper in front of it.
//!
//! Many agents, each running on its own unit, submit small groups of feature vectors.
//! Running them one group at a time would starve the channel, so a [`BatchingFactory`]
//! hands every agent a [`BatchingHandle`] and groups the submissions of all registered
//! handles into batches of [`compute_batch_size`] features.
//!
//! A queue is flushed when it holds at least a full batch, or when every registered
//! handle is blocked in a request (nobody else can add to the batch). A handle that is
//! registered but idle therefore holds back partial batches: evaluators create a handle
//! per move and drop it right after the move was chosen.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, bail, ensure, Context};
use tracing::{debug, trace};

/// Input of one network evaluation. The orchestration layer never looks inside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features(pub Vec<f32>);

/// Result of one network evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    pub policy: Vec<f32>,
    pub value: f32,
}

/// Something that evaluates positions, one output per feature vector.
pub trait Inference: Send + Sync {
    /// Evaluate all `features`; the result has the same length and order.
    fn run_many(&self, features: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>>;

    /// Number of batches the channel can pipeline.
    fn buffer_count(&self) -> usize {
        1
    }
}

/// Opens an inference channel for a model path.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_path: &str) -> anyhow::Result<Arc<dyn Inference>>;
}

/// Batch size that keeps `buffer_count` batches able to absorb every feature vector
/// `parallel_agents` agents can have in flight, and never below one agent's burst.
pub fn compute_batch_size(
    virtual_losses: usize,
    parallel_agents: usize,
    buffer_count: usize,
) -> usize {
    let buffer_count = buffer_count.max(1);
    virtual_losses.max((virtual_losses * parallel_agents).div_ceil(buffer_count))
}

type Reply = anyhow::Result<Vec<InferenceOutput>>;

struct Request {
    features: Vec<Features>,
    reply: mpsc::SyncSender<Reply>,
}

#[derive(Default)]
struct QueueState {
    clients: usize,
    waiting: usize,
    queued_features: usize,
    queue: VecDeque<Request>,
    batches_run: u64,
    features_run: u64,
}

/// Counters of a batching service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingStats {
    pub clients: usize,
    pub batches_run: u64,
    pub features_run: u64,
}

struct BatchingService {
    channel: Arc<dyn Inference>,
    batch_size: usize,
    state: Mutex<QueueState>,
}

impl BatchingService {
    fn submit(&self, features: Vec<Features>) -> Reply {
        if features.is_empty() {
            return Ok(vec![]);
        }
        let (reply, response) = mpsc::sync_channel(1);
        let ready = {
            let mut state = self.state.lock().expect("poisoned");
            state.waiting += 1;
            state.queued_features += features.len();
            state.queue.push_back(Request { features, reply });
            self.take_ready_batches(&mut state)
        };
        self.run_batches(ready);
        response
            .recv()
            .context("inference request was dropped before being answered")?
    }

    fn register(&self) {
        self.state.lock().expect("poisoned").clients += 1;
    }

    fn unregister(&self) {
        let ready = {
            let mut state = self.state.lock().expect("poisoned");
            state.clients -= 1;
            self.take_ready_batches(&mut state)
        };
        self.run_batches(ready);
    }

    fn take_ready_batches(&self, state: &mut QueueState) -> Vec<Vec<Request>> {
        let mut batches = vec![];
        while !state.queue.is_empty()
            && (state.queued_features >= self.batch_size || state.waiting >= state.clients)
        {
            let mut batch = vec![];
            let mut size = 0;
            while size < self.batch_size {
                let Some(request) = state.queue.pop_front() else {
                    break;
                };
                size += request.features.len();
                batch.push(request);
            }
            state.queued_features -= size;
            batches.push(batch);
        }
        batches
    }

    fn run_batches(&self, batches: Vec<Vec<Request>>) {
        for batch in batches {
            self.run_batch(batch);
        }
    }

    fn run_batch(&self, batch: Vec<Request>) {
        let mut counts = Vec::with_capacity(batch.len());
        let mut replies = Vec::with_capacity(batch.len());
        let mut features = vec![];
        for request in batch {
            counts.push(request.features.len());
            features.extend(request.features);
            replies.push(request.reply);
        }
        let total = features.len();
        trace!(requests = replies.len(), features = total, "running batch");

        let result = self.channel.run_many(features).and_then(|outputs| {
            ensure!(
                outputs.len() == total,
                "inference returned {} outputs for {total} features",
                outputs.len()
            );
            Ok(outputs)
        });

        {
            let mut state = self.state.lock().expect("poisoned");
            state.waiting -= replies.len();
            state.batches_run += 1;
            state.features_run += total as u64;
        }

        match result {
            Ok(outputs) => {
                let mut outputs = outputs.into_iter();
                for (reply, count) in replies.into_iter().zip(counts) {
                    let _ = reply.send(Ok(outputs.by_ref().take(count).collect()));
                }
            }
            Err(e) => {
                debug!("batch failed: {e:#}");
                let message = format!("{e:#}");
                for reply in replies {
                    let _ = reply.send(Err(anyhow!("inference failed: {message}")));
                }
            }
        }
    }
}

/// Creates per-agent handles on one shared, batched inference channel.
#[derive(Clone)]
pub struct BatchingFactory {
    service: Arc<BatchingService>,
}

impl BatchingFactory {
    /// Wrap `channel`, sizing batches for `parallel_agents` agents issuing up to
    /// `virtual_losses` feature vectors each.
    pub fn new(channel: Arc<dyn Inference>, virtual_losses: usize, parallel_agents: usize) -> Self {
        let batch_size =
            compute_batch_size(virtual_losses, parallel_agents, channel.buffer_count());
        debug!(
            virtual_losses,
            parallel_agents,
            buffer_count = channel.buffer_count(),
            batch_size,
            "batching factory created"
        );
        Self::with_batch_size(channel, batch_size)
    }

    pub fn with_batch_size(channel: Arc<dyn Inference>, batch_size: usize) -> Self {
        Self {
            service: Arc::new(BatchingService {
                channel,
                batch_size: batch_size.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Register a new handle. Requests of live handles are grouped together.
    pub fn new_handle(&self) -> BatchingHandle {
        self.service.register();
        BatchingHandle {
            service: self.service.clone(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.service.batch_size
    }

    pub fn stats(&self) -> BatchingStats {
        let state = self.service.state.lock().expect("poisoned");
        BatchingStats {
            clients: state.clients,
            batches_run: state.batches_run,
            features_run: state.features_run,
        }
    }
}

/// One agent's view of a [`BatchingFactory`]. Unregisters on drop.
pub struct BatchingHandle {
    service: Arc<BatchingService>,
}

impl Inference for BatchingHandle {
    fn run_many(&self, features: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>> {
        self.service.submit(features)
    }
}

impl Drop for BatchingHandle {
    fn drop(&mut self) {
        self.service.unregister();
    }
}

/// Replaceable inference handle shared by the two agents of one paired game.
///
/// The owning unit installs a fresh handle before each move and clears it afterwards;
/// the agents only ever see the slot.
#[derive(Clone, Default)]
pub struct ModelSlot {
    active: Arc<RwLock<Option<Box<dyn Inference>>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, handle: Box<dyn Inference>) {
        *self.active.write().expect("poisoned") = Some(handle);
    }

    /// Drop the installed handle, if any.
    pub fn clear(&self) {
        self.active.write().expect("poisoned").take();
    }
}

impl Inference for ModelSlot {
    fn run_many(&self, features: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>> {
        let active = self.active.read().expect("poisoned");
        match active.as_ref() {
            Some(handle) => handle.run_many(features),
            None => bail!("no inference handle installed in model slot"),
        }
    }
}

#[cfg(test)]
mod inference_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<usize>>,
        buffers: usize,
    }

    impl Inference for Recorder {
        fn run_many(&self, features: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>> {
            self.calls.lock().unwrap().push(features.len());
            Ok(features
                .iter()
                .map(|f| InferenceOutput {
                    policy: f.0.clone(),
                    value: f.0.first().copied().unwrap_or_default(),
                })
                .collect())
        }

        fn buffer_count(&self) -> usize {
            self.buffers
        }
    }

    struct Broken;

    impl Inference for Broken {
        fn run_many(&self, _: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>> {
            bail!("device lost")
        }
    }

    #[test]
    fn batch_size_formula() {
        assert_eq!(compute_batch_size(8, 32, 8), 32);
        assert_eq!(compute_batch_size(8, 1, 8), 8);
        assert_eq!(compute_batch_size(8, 3, 2), 12);
        assert_eq!(compute_batch_size(8, 5, 3), 14);
        assert_eq!(compute_batch_size(1, 1, 1), 1);
    }

    #[test]
    fn batch_size_never_below_virtual_losses() {
        for vl in 1..10 {
            for agents in 1..20 {
                for buffers in 1..10 {
                    let size = compute_batch_size(vl, agents, buffers);
                    assert!(size >= vl);
                    assert!(size * buffers >= vl * agents);
                }
            }
        }
    }

    #[test]
    fn factory_uses_channel_buffer_count() {
        let channel = Arc::new(Recorder {
            buffers: 8,
            ..Default::default()
        });
        let factory = BatchingFactory::new(channel, 8, 32);
        assert_eq!(factory.batch_size(), 32);
    }

    #[test]
    fn single_handle_flushes_immediately() {
        let channel = Arc::new(Recorder::default());
        let factory = BatchingFactory::with_batch_size(channel.clone(), 100);
        let handle = factory.new_handle();
        let out = handle
            .run_many(vec![Features(vec![1.0]), Features(vec![2.0])])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].value, 2.0);
        assert_eq!(*channel.calls.lock().unwrap(), vec![2]);
    }

    #[test]
    fn concurrent_handles_share_one_batch() {
        let channel = Arc::new(Recorder::default());
        let factory = BatchingFactory::with_batch_size(channel.clone(), 1000);
        let handles: Vec<_> = (0..4).map(|_| factory.new_handle()).collect();
        let answered = AtomicUsize::new(0);
        thread::scope(|s| {
            for (i, handle) in handles.iter().enumerate() {
                let answered = &answered;
                s.spawn(move || {
                    let value = i as f32;
                    let out = handle
                        .run_many(vec![Features(vec![value]); 3])
                        .unwrap();
                    assert!(out.iter().all(|o| o.value == value));
                    answered.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(answered.load(Ordering::SeqCst), 4);
        assert_eq!(*channel.calls.lock().unwrap(), vec![12]);
        assert_eq!(factory.stats().batches_run, 1);
    }

    #[test]
    fn full_batch_flushes_without_waiting_for_everyone() {
        let channel = Arc::new(Recorder::default());
        let factory = BatchingFactory::with_batch_size(channel.clone(), 4);
        let _idle = factory.new_handle();
        let busy = factory.new_handle();
        let out = busy.run_many(vec![Features(vec![0.5]); 4]).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(factory.stats().clients, 2);
    }

    #[test]
    fn dropping_idle_handle_releases_partial_batch() {
        let channel = Arc::new(Recorder::default());
        let factory = BatchingFactory::with_batch_size(channel.clone(), 100);
        let idle = factory.new_handle();
        let busy = factory.new_handle();
        thread::scope(|s| {
            let waiter = s.spawn(|| busy.run_many(vec![Features(vec![1.0])]).unwrap());
            while factory.service.state.lock().unwrap().waiting == 0 {
                thread::yield_now();
            }
            drop(idle);
            assert_eq!(waiter.join().unwrap().len(), 1);
        });
        assert_eq!(factory.stats().clients, 1);
    }

    #[test]
    fn channel_errors_reach_every_requester() {
        let factory = BatchingFactory::with_batch_size(Arc::new(Broken), 10);
        let handle = factory.new_handle();
        let err = handle.run_many(vec![Features::default()]).unwrap_err();
        assert!(format!("{err:#}").contains("device lost"));
    }

    #[test]
    fn model_slot_delegates_to_installed_handle() {
        let channel = Arc::new(Recorder::default());
        let factory = BatchingFactory::with_batch_size(channel, 10);
        let slot = ModelSlot::new();
        let reader = slot.clone();
        assert!(reader.run_many(vec![Features::default()]).is_err());

        slot.install(Box::new(factory.new_handle()));
        assert_eq!(factory.stats().clients, 1);
        assert_eq!(reader.run_many(vec![Features(vec![3.0])]).unwrap()[0].value, 3.0);

        slot.clear();
        assert_eq!(factory.stats().clients, 0);
    }
}
