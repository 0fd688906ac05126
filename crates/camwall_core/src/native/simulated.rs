//! In-process stand-in for the native services.
//!
//! Capture threads are real threads parked on a stop flag, so the two-phase
//! close is exercised for real. Every call is journaled, and failures can be
//! injected per service kind or per camera address.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    BindRequest, BindTarget, BindingId, NativeError, NativeHandle, NativeResult, NativeServices,
    ServiceKind, ServiceParams,
};

/// One journaled native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Opened {
        handle: NativeHandle,
        kind: ServiceKind,
    },
    CloseRequested {
        handle: NativeHandle,
        kind: ServiceKind,
    },
    Closed {
        handle: NativeHandle,
        kind: ServiceKind,
    },
    Bound {
        binding: BindingId,
        handle: NativeHandle,
        stream_slot: u32,
        target: BindTarget,
    },
    Unbound {
        binding: BindingId,
        stream_slot: u32,
    },
}

struct Service {
    kind: ServiceKind,
    stop: Option<Arc<AtomicBool>>,
    thread: Option<JoinHandle<()>>,
    close_requested: bool,
}

struct Binding {
    handle: NativeHandle,
    request: BindRequest,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    next_binding: u64,
    services: HashMap<NativeHandle, Service>,
    bindings: HashMap<BindingId, Binding>,
    journal: Vec<JournalEntry>,
    bind_calls: usize,
    unbind_calls: usize,
    fail_open: HashSet<ServiceKind>,
    fail_close: HashSet<ServiceKind>,
    unreachable: HashSet<String>,
}

/// Simulated native backend.
#[derive(Default)]
pub struct SimulatedServices {
    state: Mutex<State>,
}

impl SimulatedServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `open` of `kind` fail.
    pub fn fail_open(&self, kind: ServiceKind) {
        self.state.lock().fail_open.insert(kind);
    }

    /// Make every future `wait_close` of `kind` report an error.
    pub fn fail_close(&self, kind: ServiceKind) {
        self.state.lock().fail_close.insert(kind);
    }

    /// Capture sources with this address fail to bind.
    pub fn mark_unreachable(&self, address: impl Into<String>) {
        self.state.lock().unreachable.insert(address.into());
    }

    /// Drop all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_open.clear();
        state.fail_close.clear();
        state.unreachable.clear();
    }

    /// Copy of the call journal.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Successful `bind` calls so far.
    pub fn bind_calls(&self) -> usize {
        self.state.lock().bind_calls
    }

    /// Successful `unbind` calls so far.
    pub fn unbind_calls(&self) -> usize {
        self.state.lock().unbind_calls
    }

    /// Kinds of services currently open, in handle order.
    pub fn open_services(&self) -> Vec<ServiceKind> {
        let state = self.state.lock();
        let mut handles: Vec<_> = state.services.keys().copied().collect();
        handles.sort();
        handles.iter().map(|h| state.services[h].kind).collect()
    }

    /// Requests of all live bindings, sorted by stream slot.
    pub fn active_bindings(&self) -> Vec<BindRequest> {
        let state = self.state.lock();
        let mut requests: Vec<_> = state.bindings.values().map(|b| b.request.clone()).collect();
        requests.sort_by_key(|r| r.stream_slot);
        requests
    }

    /// Live bindings carrying `target`.
    pub fn bindings_with(&self, target: BindTarget) -> usize {
        self.state
            .lock()
            .bindings
            .values()
            .filter(|b| b.request.target == target)
            .count()
    }

    fn check_target(kind: ServiceKind, request: &BindRequest) -> NativeResult<()> {
        let supported = match request.target {
            BindTarget::Source => matches!(
                kind,
                ServiceKind::LiveThread | ServiceKind::UsbThread | ServiceKind::PlaybackManager
            ),
            BindTarget::Display => kind == ServiceKind::GpuPool,
            BindTarget::Record { .. } => kind == ServiceKind::PlaybackManager,
        };
        if supported {
            Ok(())
        } else {
            Err(NativeError::bind_failed(
                request.stream_slot,
                format!("{} does not accept {} bindings", kind, request.target),
            ))
        }
    }
}

fn spawn_capture(kind: ServiceKind, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("sim-{}", kind).replace(' ', "-"))
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                thread::park_timeout(Duration::from_millis(50));
            }
        })
}

impl NativeServices for SimulatedServices {
    fn open(&self, params: &ServiceParams) -> NativeResult<NativeHandle> {
        let kind = params.kind();
        let mut state = self.state.lock();
        if state.fail_open.contains(&kind) {
            return Err(NativeError::open_failed(kind, "injected failure"));
        }

        let (stop, thread) = match kind {
            ServiceKind::LiveThread | ServiceKind::UsbThread => {
                let stop = Arc::new(AtomicBool::new(false));
                let thread = spawn_capture(kind, Arc::clone(&stop))
                    .map_err(|e| NativeError::open_failed(kind, e.to_string()))?;
                (Some(stop), Some(thread))
            }
            _ => (None, None),
        };

        state.next_handle += 1;
        let handle = NativeHandle(state.next_handle);
        state.services.insert(
            handle,
            Service {
                kind,
                stop,
                thread,
                close_requested: false,
            },
        );
        state.journal.push(JournalEntry::Opened { handle, kind });
        Ok(handle)
    }

    fn request_close(&self, handle: NativeHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        let service = state
            .services
            .get_mut(&handle)
            .ok_or(NativeError::UnknownHandle(handle))?;
        service.close_requested = true;
        if let Some(stop) = &service.stop {
            stop.store(true, Ordering::Release);
        }
        if let Some(thread) = &service.thread {
            thread.thread().unpark();
        }
        let kind = service.kind;
        state.journal.push(JournalEntry::CloseRequested { handle, kind });
        Ok(())
    }

    fn wait_close(&self, handle: NativeHandle) -> NativeResult<()> {
        let (kind, thread, attached, fail) = {
            let mut state = self.state.lock();
            let mut service = state
                .services
                .remove(&handle)
                .ok_or(NativeError::UnknownHandle(handle))?;
            if !service.close_requested {
                if let Some(stop) = &service.stop {
                    stop.store(true, Ordering::Release);
                }
            }
            let attached = state
                .bindings
                .values()
                .filter(|b| b.handle == handle)
                .count();
            let fail = state.fail_close.contains(&service.kind);
            state.journal.push(JournalEntry::Closed {
                handle,
                kind: service.kind,
            });
            (service.kind, service.thread.take(), attached, fail)
        };

        if let Some(thread) = thread {
            thread.thread().unpark();
            if thread.join().is_err() {
                return Err(NativeError::CloseFailed {
                    service: kind,
                    handle,
                    reason: "thread panicked".to_string(),
                });
            }
        }

        if attached > 0 {
            return Err(NativeError::CloseFailed {
                service: kind,
                handle,
                reason: format!("{} bindings still attached", attached),
            });
        }
        if fail {
            return Err(NativeError::CloseFailed {
                service: kind,
                handle,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn bind(&self, handle: NativeHandle, request: &BindRequest) -> NativeResult<BindingId> {
        let mut state = self.state.lock();
        let service = state
            .services
            .get(&handle)
            .ok_or(NativeError::UnknownHandle(handle))?;
        if service.close_requested {
            return Err(NativeError::bind_failed(
                request.stream_slot,
                format!("{} is closing", service.kind),
            ));
        }
        Self::check_target(service.kind, request)?;

        if let Some(address) = &request.address {
            if state.unreachable.contains(address) {
                return Err(NativeError::bind_failed(
                    request.stream_slot,
                    format!("{} unreachable", address),
                ));
            }
        }

        state.next_binding += 1;
        let binding = BindingId(state.next_binding);
        state.bindings.insert(
            binding,
            Binding {
                handle,
                request: request.clone(),
            },
        );
        state.bind_calls += 1;
        state.journal.push(JournalEntry::Bound {
            binding,
            handle,
            stream_slot: request.stream_slot,
            target: request.target,
        });
        Ok(binding)
    }

    fn unbind(&self, binding: BindingId) -> NativeResult<()> {
        let mut state = self.state.lock();
        let removed = state
            .bindings
            .remove(&binding)
            .ok_or(NativeError::UnknownBinding(binding))?;
        state.unbind_calls += 1;
        state.journal.push(JournalEntry::Unbound {
            binding,
            stream_slot: removed.request.stream_slot,
        });
        Ok(())
    }
}

impl Drop for SimulatedServices {
    fn drop(&mut self) {
        let services: Vec<Service> = self.state.get_mut().services.drain().map(|(_, s)| s).collect();
        for mut service in services {
            if let Some(stop) = &service.stop {
                stop.store(true, Ordering::Release);
            }
            if let Some(thread) = service.thread.take() {
                thread.thread().unpark();
                let _ = thread.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaptureKind;
    use crate::native::CpuPlan;

    fn live_params() -> ServiceParams {
        ServiceParams::CaptureThread {
            kind: CaptureKind::Live,
            affinity: None,
        }
    }

    #[test]
    fn two_phase_close_joins_capture_thread() {
        let native = SimulatedServices::new();
        let handle = native.open(&live_params()).unwrap();
        assert_eq!(native.open_services(), vec![ServiceKind::LiveThread]);

        native.request_close(handle).unwrap();
        native.wait_close(handle).unwrap();
        assert!(native.open_services().is_empty());

        let journal = native.journal();
        assert_eq!(
            journal,
            vec![
                JournalEntry::Opened {
                    handle,
                    kind: ServiceKind::LiveThread
                },
                JournalEntry::CloseRequested {
                    handle,
                    kind: ServiceKind::LiveThread
                },
                JournalEntry::Closed {
                    handle,
                    kind: ServiceKind::LiveThread
                },
            ]
        );
    }

    #[test]
    fn injected_open_failure() {
        let native = SimulatedServices::new();
        native.fail_open(ServiceKind::UsbThread);
        let err = native
            .open(&ServiceParams::CaptureThread {
                kind: CaptureKind::Usb,
                affinity: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            NativeError::OpenFailed {
                service: ServiceKind::UsbThread,
                ..
            }
        ));
    }

    #[test]
    fn unreachable_address_fails_bind() {
        let native = SimulatedServices::new();
        native.mark_unreachable("rtsp://a:b@10.0.0.9");
        let handle = native.open(&live_params()).unwrap();

        let err = native
            .bind(handle, &BindRequest::source(1, "rtsp://a:b@10.0.0.9"))
            .unwrap_err();
        assert!(matches!(err, NativeError::BindFailed { stream_slot: 1, .. }));
        assert_eq!(native.bind_calls(), 0);

        let binding = native
            .bind(handle, &BindRequest::source(4, "rtsp://a:b@10.0.0.10"))
            .unwrap();
        native.unbind(binding).unwrap();
        assert_eq!((native.bind_calls(), native.unbind_calls()), (1, 1));
        native.close(handle).unwrap();
    }

    #[test]
    fn wrong_target_is_rejected() {
        let native = SimulatedServices::new();
        let cpu = native
            .open(&ServiceParams::CpuScheme(CpuPlan::unpinned()))
            .unwrap();
        assert!(native.bind(cpu, &BindRequest::display(1)).is_err());
    }

    #[test]
    fn closing_with_attached_bindings_reports_error() {
        let native = SimulatedServices::new();
        let handle = native.open(&live_params()).unwrap();
        native
            .bind(handle, &BindRequest::source(1, "rtsp://a:b@10.0.0.1"))
            .unwrap();

        let err = native.close(handle).unwrap_err();
        assert!(matches!(err, NativeError::CloseFailed { .. }));
        // The service is released regardless
        assert!(native.open_services().is_empty());
    }

    #[test]
    fn unknown_handle() {
        let native = SimulatedServices::new();
        assert_eq!(
            native.request_close(NativeHandle(99)),
            Err(NativeError::UnknownHandle(NativeHandle(99)))
        );
    }
}
