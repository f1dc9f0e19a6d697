//! Task engine: one task, bounded retry.
//!
//! A task runs as an explicit state machine:
//!
//! ```text
//! Forming -> Transmitting -> Collecting -> Satisfied
//!    ^                            |
//!    +---- (retry wait) ---- Exhausted -> unmet (retries consumed)
//! ```
//!
//! - **Forming** encodes the frame, or takes the caller's derived
//!   write-table frame. An empty frame is fatal.
//! - **Transmitting** opens a fresh endpoint, drains stale datagrams and
//!   sends.
//! - **Collecting** waits for datagrams until a wait times out. Every frame
//!   is decoded, classified into the catalog and added to the response set.
//! - **Satisfied** / **Exhausted** compare the response set with the task's
//!   requirement. Exhaustion with retries left goes back to Forming after
//!   the retry wait.
//!
//! Transport errors leave the machine immediately through `?`; they are
//! never retried. Running out of retries is not an error: the outcome
//! reports the unmet requirement and the caller decides.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::catalog::Catalog;
use crate::classify::classify;
use crate::command::Task;
use crate::device::{DeviceRecord, HardwareAddress};
use crate::error::{OrviboError, Result};
use crate::response::{Response, ResponseKind, ResponseSet};
use crate::transport::{Endpoint, Transport, MAX_PACKET_SIZE};
use crate::utils::hex_dump;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Default wait between attempts.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(500);

/// Upper bound (exclusive) for the retry wait.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Retry bounds for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_wait: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::InvalidParameter` if `retry_wait` is one second
    /// or more.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(4, Duration::from_millis(500)).unwrap();
    /// assert_eq!(policy.max_attempts(), 5);
    ///
    /// assert!(RetryPolicy::new(4, Duration::from_secs(1)).is_err());
    /// ```
    pub fn new(max_retries: u32, retry_wait: Duration) -> Result<Self> {
        if retry_wait >= MAX_RETRY_WAIT {
            return Err(OrviboError::invalid_parameter(
                "retry_wait",
                format!("must be less than 1 second, got {:?}", retry_wait),
            ));
        }
        Ok(Self {
            max_retries,
            retry_wait,
        })
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait between attempts.
    pub fn retry_wait(&self) -> Duration {
        self.retry_wait
    }

    /// Total attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait: DEFAULT_RETRY_WAIT,
        }
    }
}

/// Where a task's frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The configured broadcast address.
    Broadcast,
    /// One device address.
    Unicast(Ipv4Addr),
}

/// One task to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    /// Task.
    pub task: Task,
    /// Destination.
    pub destination: Destination,
    /// Hardware address patched into the frame.
    pub hardware_address: Option<HardwareAddress>,
    /// Pre-built frame, used for write-table tasks.
    pub frame: Option<Vec<u8>>,
    /// Keep the first complete read-table reply.
    pub capture_table: bool,
}

impl TaskRequest {
    /// Broadcast request without a target.
    pub fn broadcast(task: Task) -> Self {
        Self {
            task,
            destination: Destination::Broadcast,
            hardware_address: None,
            frame: None,
            capture_table: false,
        }
    }

    /// Unicast request to `address` without a target hardware address.
    pub fn unicast(task: Task, address: Ipv4Addr) -> Self {
        Self {
            destination: Destination::Unicast(address),
            ..Self::broadcast(task)
        }
    }

    /// Unicast request aimed at a known device.
    pub fn for_device(task: Task, record: &DeviceRecord) -> Self {
        Self {
            hardware_address: Some(record.hardware_address),
            ..Self::unicast(task, record.address)
        }
    }

    /// Supplies the frame to send instead of encoding one.
    pub fn with_frame(mut self, frame: Vec<u8>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Keeps the first complete read-table reply in the outcome.
    pub fn capturing_table(mut self) -> Self {
        self.capture_table = true;
        self
    }
}

/// Result of a task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Task that ran.
    pub task: Task,
    /// Response categories seen across all attempts.
    pub responses: ResponseSet,
    /// Number of sends.
    pub attempts: u32,
    /// Captured read-table reply, if requested and received complete.
    pub table: Option<Vec<u8>>,
    /// Whether the requirement was met.
    pub satisfied: bool,
}

impl TaskOutcome {
    /// Converts an unmet outcome into `OrviboError::RequirementNotMet`.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::RequirementNotMet` if the task was not satisfied.
    pub fn into_satisfied(self) -> Result<Self> {
        if self.satisfied {
            Ok(self)
        } else {
            Err(OrviboError::RequirementNotMet {
                task: self.task,
                required: self.task.required(),
                attempts: self.attempts,
            })
        }
    }
}

enum TaskState<E> {
    Forming,
    Transmitting(Vec<u8>),
    Collecting(E),
    Satisfied,
    Exhausted,
}

/// Runs tasks over a transport.
#[derive(Debug)]
pub struct TaskEngine<T: Transport> {
    transport: T,
    port: u16,
    broadcast_address: Ipv4Addr,
    policy: RetryPolicy,
}

impl<T: Transport> TaskEngine<T> {
    /// Creates an engine sending to `port`.
    pub fn new(transport: T, port: u16, broadcast_address: Ipv4Addr, policy: RetryPolicy) -> Self {
        Self {
            transport,
            port,
            broadcast_address,
            policy,
        }
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one task to satisfaction or exhaustion.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be formed or is empty, or on
    /// any transport failure. An unmet requirement is reported through
    /// [`TaskOutcome::satisfied`], not as an error.
    pub fn run(&mut self, catalog: &mut Catalog, request: &TaskRequest) -> Result<TaskOutcome> {
        let task = request.task;
        let required = task.required();
        let mut outcome = TaskOutcome {
            task,
            responses: ResponseSet::EMPTY,
            attempts: 0,
            table: None,
            satisfied: false,
        };

        let mut state = TaskState::Forming;
        loop {
            state = match state {
                TaskState::Forming => {
                    let frame = self.form(request)?;
                    if frame.is_empty() {
                        return Err(OrviboError::EmptyFrame { task });
                    }
                    TaskState::Transmitting(frame)
                }
                TaskState::Transmitting(frame) => {
                    let target = self.target(request.destination);
                    let mut endpoint = self.transport.open(request.destination == Destination::Broadcast)?;
                    endpoint.drain_pending()?;

                    outcome.attempts += 1;
                    debug!("{} -> {} (attempt {})", task, target, outcome.attempts);
                    trace!("out:\n{}", hex_dump(&frame, 2));
                    endpoint.send_to(&frame, target)?;
                    TaskState::Collecting(endpoint)
                }
                TaskState::Collecting(mut endpoint) => {
                    self.collect(&mut endpoint, catalog, request, &mut outcome)?;
                    if outcome.responses.contains_all(required) {
                        TaskState::Satisfied
                    } else {
                        TaskState::Exhausted
                    }
                }
                TaskState::Satisfied => {
                    debug!("{} satisfied ({}) after {} attempt(s)", task, outcome.responses, outcome.attempts);
                    outcome.satisfied = true;
                    return Ok(outcome);
                }
                TaskState::Exhausted => {
                    if outcome.attempts < self.policy.max_attempts() {
                        info!(
                            "{}: retry {} (seen {}, need {})",
                            task, outcome.attempts, outcome.responses, required
                        );
                        thread::sleep(self.policy.retry_wait);
                        TaskState::Forming
                    } else {
                        warn!(
                            "{}: required response {} not received after {} attempt(s)",
                            task, required, outcome.attempts
                        );
                        return Ok(outcome);
                    }
                }
            };
        }
    }

    fn form(&self, request: &TaskRequest) -> Result<Vec<u8>> {
        match &request.frame {
            Some(frame) => Ok(frame.clone()),
            None => request.task.encode(request.hardware_address),
        }
    }

    fn target(&self, destination: Destination) -> SocketAddrV4 {
        match destination {
            Destination::Broadcast => SocketAddrV4::new(self.broadcast_address, self.port),
            Destination::Unicast(address) => SocketAddrV4::new(address, self.port),
        }
    }

    fn collect(
        &self,
        endpoint: &mut T::Endpoint,
        catalog: &mut Catalog,
        request: &TaskRequest,
        outcome: &mut TaskOutcome,
    ) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        while let Some((len, from)) = endpoint.recv_from(&mut buf)? {
            let data = &buf[..len];
            trace!("in ({} bytes from {}):\n{}", len, from, hex_dump(data, 2));

            let response = match Response::decode(data) {
                Ok(response) => response,
                Err(e) => {
                    debug!("dropping datagram from {}: {}", from, e);
                    continue;
                }
            };

            let classification = classify(catalog, &response, from);
            outcome.responses.insert(classification.category);

            if request.capture_table
                && outcome.table.is_none()
                && response.kind == ResponseKind::ReadTable
            {
                if response.is_complete() {
                    outcome.table = Some(data.to_vec());
                } else {
                    warn!(
                        "unexpected read-table length: received {}, declared {}",
                        response.received, response.declared_length
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SortMode;
    use crate::device::SwitchState;
    use crate::transport::scripted::ScriptedTransport;

    const MAC_A: [u8; 6] = [0xac, 0xcf, 0x23, 0x00, 0x00, 0x0a];
    const MAC_B: [u8; 6] = [0xac, 0xcf, 0x23, 0x00, 0x00, 0x0b];

    fn qa_reply(mac: [u8; 6], state: u8) -> Vec<u8> {
        let mut data = hex::decode(concat!(
            "6864002a7161",
            "00000000000000",   // hardware address, patched below
            "202020202020",
            "000000000000",
            "202020202020",
            "534f43303035",
            "00000000",
            "00",
        ))
        .unwrap();
        data[7..13].copy_from_slice(&mac);
        data[41] = state;
        data
    }

    fn engine(transport: ScriptedTransport, wait_ms: u64) -> TaskEngine<ScriptedTransport> {
        let policy = RetryPolicy::new(DEFAULT_MAX_RETRIES, Duration::from_millis(wait_ms)).unwrap();
        TaskEngine::new(transport, 10000, Ipv4Addr::BROADCAST, policy)
    }

    #[test]
    fn test_retry_bound_with_silent_peer() {
        let transport = ScriptedTransport::silent();
        let mut engine = engine(transport.clone(), 20);
        let mut catalog = Catalog::new(SortMode::Address);
        let record = DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 5), HardwareAddress::new(MAC_A));

        let outcome = engine
            .run(&mut catalog, &TaskRequest::for_device(Task::Subscribe, &record))
            .unwrap();

        assert!(!outcome.satisfied);
        assert_eq!(outcome.attempts, DEFAULT_MAX_RETRIES + 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 5);
        for pair in sent.windows(2) {
            assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_millis(20));
        }
        assert!(sent
            .iter()
            .all(|s| s.target == SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 10000)));

        let err = outcome.into_satisfied().unwrap_err();
        assert!(matches!(
            err,
            OrviboError::RequirementNotMet {
                task: Task::Subscribe,
                attempts: 5,
                ..
            }
        ));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_broadcast_discovery_two_devices() {
        let transport = ScriptedTransport::responding(|frame, _| {
            if &frame[4..6] == b"qa" {
                vec![
                    // Our own query looped back first.
                    (frame.to_vec(), Ipv4Addr::new(10, 0, 0, 1)),
                    (qa_reply(MAC_B, 1), Ipv4Addr::new(10, 0, 0, 9)),
                    (qa_reply(MAC_A, 0), Ipv4Addr::new(10, 0, 0, 5)),
                ]
            } else {
                Vec::new()
            }
        });
        let mut engine = engine(transport.clone(), 1);
        let mut catalog = Catalog::new(SortMode::Address);

        let outcome = engine
            .run(&mut catalog, &TaskRequest::broadcast(Task::GlobalDiscoveryBroadcast))
            .unwrap();

        assert!(outcome.satisfied);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(catalog.len(), 2);

        let records = catalog.records();
        assert_eq!(records[0].address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(records[0].state, SwitchState::Off);
        assert_eq!(records[1].address, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(records[1].state, SwitchState::On);

        assert_eq!(transport.script.borrow().opens, vec![true]);
        assert_eq!(transport.sent()[0].target.ip(), &Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_satisfied_on_later_attempt() {
        let mut calls = 0;
        let transport = ScriptedTransport::responding(move |_, _| {
            calls += 1;
            if calls < 3 {
                Vec::new()
            } else {
                vec![(b"hd\x00\x16hb\xac\xcf\x23\x00\x00\x0a      \x00\x00\x00\x00".to_vec(), Ipv4Addr::new(10, 0, 0, 5))]
            }
        });
        let mut engine = engine(transport.clone(), 1);
        let mut catalog = Catalog::new(SortMode::Address);

        let outcome = engine
            .run(&mut catalog, &TaskRequest::unicast(Task::Heartbeat, Ipv4Addr::new(10, 0, 0, 5)))
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.responses, ResponseSet::HB);
        assert_eq!(transport.script.borrow().opens, vec![false, false, false]);
    }

    #[test]
    fn test_send_failure_is_not_retried() {
        let transport = ScriptedTransport::silent();
        transport.script.borrow_mut().fail_send = true;
        let mut engine = engine(transport.clone(), 1);
        let mut catalog = Catalog::new(SortMode::Address);

        let err = engine
            .run(&mut catalog, &TaskRequest::broadcast(Task::GlobalDiscoveryBroadcast))
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.script.borrow().opens.len(), 1);
    }

    #[test]
    fn test_receive_failure_is_not_retried() {
        let transport = ScriptedTransport::silent();
        transport.script.borrow_mut().fail_recv = true;
        let mut engine = engine(transport.clone(), 1);
        let mut catalog = Catalog::new(SortMode::Address);
        let record = DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 5), HardwareAddress::new(MAC_A));

        let err = engine
            .run(&mut catalog, &TaskRequest::for_device(Task::Subscribe, &record))
            .unwrap_err();
        assert!(matches!(err, OrviboError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.script.borrow().opens.len(), 1);
    }

    #[test]
    fn test_empty_frame_is_fatal() {
        let mut engine = engine(ScriptedTransport::silent(), 1);
        let mut catalog = Catalog::new(SortMode::Address);
        let request = TaskRequest::unicast(Task::WriteTableSocket, Ipv4Addr::new(10, 0, 0, 5))
            .with_frame(Vec::new());
        assert!(matches!(
            engine.run(&mut catalog, &request),
            Err(OrviboError::EmptyFrame {
                task: Task::WriteTableSocket
            })
        ));
    }

    #[test]
    fn test_write_table_without_frame_is_unsupported() {
        let mut engine = engine(ScriptedTransport::silent(), 1);
        let mut catalog = Catalog::new(SortMode::Address);
        let request = TaskRequest::unicast(Task::WriteTableSocket, Ipv4Addr::new(10, 0, 0, 5));
        assert!(matches!(
            engine.run(&mut catalog, &request),
            Err(OrviboError::UnsupportedTask { .. })
        ));
    }

    #[test]
    fn test_stale_datagrams_are_drained() {
        let transport = ScriptedTransport::silent();
        transport
            .script
            .borrow_mut()
            .stale
            .push((qa_reply(MAC_A, 1), Ipv4Addr::new(10, 0, 0, 5)));
        let mut engine = engine(transport.clone(), 1);
        let mut catalog = Catalog::new(SortMode::Address);

        let outcome = engine
            .run(&mut catalog, &TaskRequest::broadcast(Task::GlobalDiscoveryBroadcast))
            .unwrap();
        assert!(!outcome.satisfied);
        assert!(catalog.is_empty());
        assert_eq!(transport.script.borrow().drained, 1);
    }

    #[test]
    fn test_table_capture_requires_matching_length() {
        let mut full = vec![0u8; 120];
        full[..6].copy_from_slice(b"hd\x00\x78rt");
        full[6..12].copy_from_slice(&MAC_A);
        full[23] = 4;
        let mut short = full.clone();
        short.truncate(100);

        let replies = vec![short, full.clone()];
        let transport = ScriptedTransport::responding(move |_, _| {
            replies
                .iter()
                .map(|r| (r.clone(), Ipv4Addr::new(10, 0, 0, 5)))
                .collect()
        });
        let mut engine = engine(transport, 1);
        let mut catalog = Catalog::new(SortMode::Address);
        let record = DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 5), HardwareAddress::new(MAC_A));

        let outcome = engine
            .run(
                &mut catalog,
                &TaskRequest::for_device(Task::ReadTableSocket, &record).capturing_table(),
            )
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.table, Some(full));
    }
}
