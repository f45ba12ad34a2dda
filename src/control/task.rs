//! Dispatcher task driving the command queue on the Embassy executor.
//!
//! Each loop iteration `select3`s on a UI command, a load report from the
//! transport, and the dispatcher's next deadline, then forwards whatever the
//! dispatcher decided to the transport and the UI.

use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Instant, Timer};

use crate::clock::{Clock, SystemClock};
use crate::config::{DeviceConfig, DispatchConfig};
use crate::ui::{ConnectivityStatus, UICommand, UIRefreshState};
use crate::{UICommandQueueReceiver, UIRefreshQueueSender};

use super::address::DeviceAddress;
use super::queue::{DispatchAction, DispatchOutcome, Dispatcher};
use super::transport::{HttpLoader, LoadReportQueue, SideChannelTransport};

/// Wait used when the dispatcher has nothing scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Main dispatcher task.
///
/// # Parameters
///
/// * `device` - Device defaults (initial address until the UI sends one)
/// * `dispatch` - Timeout and cooldown of the queue
/// * `ui_refresh_tx` - Channel for connectivity and diagnostic updates
/// * `ui_command_rx` - Channel for dispatch requests and address changes
#[embassy_executor::task]
pub async fn dispatcher_task(
    device: DeviceConfig,
    dispatch: DispatchConfig,
    ui_refresh_tx: UIRefreshQueueSender,
    ui_command_rx: UICommandQueueReceiver,
) {
    let report_queue: &'static LoadReportQueue = Box::leak(Box::new(LoadReportQueue::new()));
    let mut transport = HttpLoader::new(report_queue.sender(), std::time::Duration::from_millis(dispatch.timeout_ms));
    let mut dispatcher = Dispatcher::new(SystemClock, DeviceAddress::normalize(&device.default_address), &dispatch);

    log::info!("Dispatcher task started, device address {}", dispatcher.address());

    loop {
        let wake = match dispatcher.next_wakeup() {
            Some(at) => Timer::at(Instant::from_millis(at)),
            None => Timer::after(IDLE_WAIT),
        };

        let action = match select3(ui_command_rx.receive(), report_queue.receive(), wake).await {
            Either3::First(UICommand::Dispatch(command)) => {
                log::debug!("Enqueue {}", command.label());
                dispatcher.enqueue(command.to_job())
            }
            Either3::First(UICommand::SetDeviceAddress(address)) => {
                log::info!("Device address set to {}", address);
                dispatcher.set_address(address);
                None
            }
            Either3::Second(report) => dispatcher.on_signal(report.job_id, report.signal),
            Either3::Third(()) => dispatcher.on_tick(),
        };

        handle_action(action, &mut dispatcher, &mut transport, &ui_refresh_tx);
        let _ = ui_refresh_tx.try_send(UIRefreshState::QueueDepth(dispatcher.pending()));
    }
}

/// Carry out a dispatcher decision. An issue the transport refuses resolves
/// straight away, so this loops until nothing further follows.
///
/// UI updates use `try_send`: a UI that falls behind loses status lines but
/// never stalls the queue.
fn handle_action<C: Clock, T: SideChannelTransport>(
    mut action: Option<DispatchAction>,
    dispatcher: &mut Dispatcher<C>,
    transport: &mut T,
    ui_refresh_tx: &UIRefreshQueueSender,
) {
    while let Some(current) = action.take() {
        match current {
            DispatchAction::Issue(issue) => {
                log::info!("SEND: {}", issue.url);
                let _ = ui_refresh_tx.try_send(UIRefreshState::Connectivity(ConnectivityStatus::Sending));
                let _ = ui_refresh_tx.try_send(UIRefreshState::Diagnostic(format!("SEND: {}", issue.url)));

                if let Err(e) = transport.load(issue.job_id, &issue.url) {
                    log::warn!("Transport refused {}: {}", issue.label, e);
                    action = dispatcher.on_issue_error(issue.job_id, e.to_string());
                }
            }
            DispatchAction::Resolved(resolution) => {
                let (status, message) = match &resolution.outcome {
                    DispatchOutcome::Sent => {
                        log::info!("SENT: {}", resolution.label);
                        (ConnectivityStatus::Sent, format!("SENT: {}", resolution.label))
                    }
                    DispatchOutcome::Failed(failure) => {
                        log::warn!("FAIL: {} ({})", resolution.label, failure);
                        (ConnectivityStatus::Offline, format!("FAIL: {}\n{}", resolution.label, failure))
                    }
                };
                let _ = ui_refresh_tx.try_send(UIRefreshState::Connectivity(status));
                let _ = ui_refresh_tx.try_send(UIRefreshState::Diagnostic(message));
            }
        }
    }
}
