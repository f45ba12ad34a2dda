//! Side-channel transport for device commands.
//!
//! A load only ever reports whether the exchange completed. The HTTP status
//! and body are dropped unread, so a 404 from the device still counts as
//! `Loaded`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use reqwest::blocking::Client;
use std::sync::mpsc;
use std::time::Duration;

use super::queue::JobId;

/// Completion signal of a single load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSignal {
    /// The exchange finished without a network-level error.
    Loaded,
    /// The exchange failed at the network level.
    Error,
}

/// A completion signal tagged with the job it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub job_id: JobId,
    pub signal: LoadSignal,
}

pub const LOAD_REPORT_QUEUE_SIZE: usize = 8;
/// Bounded channel carrying load reports back to the dispatcher task.
pub type LoadReportQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, LoadReport, LOAD_REPORT_QUEUE_SIZE>;
pub type LoadReportQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, LoadReport, LOAD_REPORT_QUEUE_SIZE>;
pub type LoadReportQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, LoadReport, LOAD_REPORT_QUEUE_SIZE>;

/// The transport could not accept a load at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Fire-and-forget loader. Completion arrives later as a [`LoadReport`].
pub trait SideChannelTransport {
    fn load(&mut self, job_id: JobId, url: &str) -> Result<(), TransportError>;
}

/// HTTP loader backed by a single worker thread.
///
/// The worker is started on the first load and reused for every later one.
pub struct HttpLoader {
    request_tx: Option<mpsc::Sender<(JobId, String)>>,
    report_tx: LoadReportQueueSender,
    request_timeout: Duration,
}

impl HttpLoader {
    pub fn new(report_tx: LoadReportQueueSender, request_timeout: Duration) -> Self {
        Self {
            request_tx: None,
            report_tx,
            request_timeout,
        }
    }

    fn ensure_worker(&mut self) -> Result<&mpsc::Sender<(JobId, String)>, TransportError> {
        if self.request_tx.is_none() {
            let (request_tx, request_rx) = mpsc::channel::<(JobId, String)>();
            let report_tx = self.report_tx.clone();
            let request_timeout = self.request_timeout;
            std::thread::Builder::new()
                .name("command-loader".to_string())
                .spawn(move || loader_worker(request_rx, report_tx, request_timeout))
                .map_err(|e| TransportError(format!("Failed to start loader thread: {}", e)))?;
            log::debug!("Command loader thread started");
            self.request_tx = Some(request_tx);
        }
        self.request_tx.as_ref().ok_or_else(|| TransportError("loader not available".to_string()))
    }
}

impl SideChannelTransport for HttpLoader {
    fn load(&mut self, job_id: JobId, url: &str) -> Result<(), TransportError> {
        let request_tx = self.ensure_worker()?;
        if request_tx.send((job_id, url.to_string())).is_err() {
            // Worker exited; the next load starts a fresh one.
            self.request_tx = None;
            return Err(TransportError("loader thread stopped".to_string()));
        }
        Ok(())
    }
}

fn loader_worker(request_rx: mpsc::Receiver<(JobId, String)>, report_tx: LoadReportQueueSender, request_timeout: Duration) {
    let client = match Client::builder().timeout(request_timeout).no_proxy().build() {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to create HTTP client: {}", e);
            return;
        }
    };

    while let Ok((job_id, url)) = request_rx.recv() {
        let signal = match client.get(&url).send() {
            Ok(_response) => LoadSignal::Loaded,
            Err(e) => {
                log::debug!("Load of {} failed: {}", url, e);
                LoadSignal::Error
            }
        };
        embassy_futures::block_on(report_tx.send(LoadReport { job_id, signal }));
    }
    log::debug!("Command loader thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_reports_error_for_the_job() {
        let queue: &'static LoadReportQueue = Box::leak(Box::new(LoadReportQueue::new()));
        let mut loader = HttpLoader::new(queue.sender(), Duration::from_millis(500));

        // Port 9 on localhost is the discard service and is closed on CI hosts.
        loader.load(7, "http://127.0.0.1:9/api/health?_ts=1").unwrap();
        let report = embassy_futures::block_on(queue.receive());
        assert_eq!(report, LoadReport { job_id: 7, signal: LoadSignal::Error });
    }

    #[test]
    fn reports_arrive_in_load_order() {
        let queue: &'static LoadReportQueue = Box::leak(Box::new(LoadReportQueue::new()));
        let mut loader = HttpLoader::new(queue.sender(), Duration::from_millis(500));

        loader.load(1, "http://127.0.0.1:9/a").unwrap();
        loader.load(2, "http://127.0.0.1:9/b").unwrap();

        let a = embassy_futures::block_on(queue.receive());
        let b = embassy_futures::block_on(queue.receive());
        assert_eq!((a.job_id, b.job_id), (1, 2));
    }
}
