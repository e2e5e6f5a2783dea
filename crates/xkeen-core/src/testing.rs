// In-memory event transport for exercising the push channel and the
// latency probe on a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use xkeen_api::{
    CredentialStore, Error, EventStream, EventTransport, MemoryCredentialStore, SseEvent,
    StreamEndpoint,
};

use crate::push::StreamContext;
use crate::signal::SessionSignal;
use crate::store::QueryCache;

pub(crate) enum Script {
    /// Handshake fails with this error.
    Fail(Error),
    /// Handshake fails with 401: the credential is cleared first.
    Unauthorized,
    /// Deliver these events, then end the stream.
    Events(Vec<SseEvent>),
    /// Deliver whatever the test pushes; ends when the sender drops.
    Live(mpsc::UnboundedReceiver<Result<SseEvent, Error>>),
}

/// Replays scripted handshakes per endpoint. Once an endpoint's scripts
/// run out, opens succeed with a stream that never yields.
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<StreamEndpoint, VecDeque<Script>>>,
    opens: Mutex<Vec<(StreamEndpoint, Instant)>>,
    credentials: Arc<MemoryCredentialStore>,
}

impl ScriptedTransport {
    pub(crate) fn new(credentials: Arc<MemoryCredentialStore>) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            opens: Mutex::new(Vec::new()),
            credentials,
        }
    }

    pub(crate) fn script(&self, endpoint: StreamEndpoint, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(script);
    }

    /// A live stream the test can push into.
    pub(crate) fn live(&self, endpoint: StreamEndpoint) -> mpsc::UnboundedSender<Result<SseEvent, Error>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script(endpoint, Script::Live(rx));
        tx
    }

    pub(crate) fn opens(&self, endpoint: StreamEndpoint) -> Vec<Instant> {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, at)| *at)
            .collect()
    }
}

impl EventTransport for ScriptedTransport {
    fn open(&self, endpoint: StreamEndpoint) -> BoxFuture<'_, Result<EventStream, Error>> {
        self.opens.lock().unwrap().push((endpoint, Instant::now()));
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);

        let result: Result<EventStream, Error> = match next {
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Unauthorized) => {
                self.credentials.clear();
                Err(Error::SessionExpired)
            }
            Some(Script::Events(events)) => {
                Ok(Box::pin(futures_util::stream::iter(events.into_iter().map(Ok))))
            }
            Some(Script::Live(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Ok(Box::pin(futures_util::stream::pending())),
        };
        Box::pin(async move { result })
    }
}

pub(crate) struct Harness {
    pub cache: Arc<QueryCache>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub signal: SessionSignal,
    pub transport: Arc<ScriptedTransport>,
}

impl Harness {
    pub(crate) fn logged_in() -> Self {
        Self::with_credentials(MemoryCredentialStore::with_token("test-token"))
    }

    pub(crate) fn logged_out() -> Self {
        Self::with_credentials(MemoryCredentialStore::new())
    }

    fn with_credentials(store: MemoryCredentialStore) -> Self {
        let credentials = Arc::new(store);
        Self {
            cache: Arc::new(QueryCache::new()),
            transport: Arc::new(ScriptedTransport::new(Arc::clone(&credentials))),
            credentials,
            signal: SessionSignal::new(),
        }
    }

    pub(crate) fn context(&self) -> StreamContext {
        StreamContext {
            transport: self.transport.clone(),
            cache: Arc::clone(&self.cache),
            credentials: self.credentials.clone(),
            signal: self.signal.clone(),
        }
    }
}

pub(crate) fn event(name: &str, data: &str) -> SseEvent {
    SseEvent::new(name, data)
}
