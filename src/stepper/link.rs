//! State shared between the main context and the step interrupts.

use core::cell::Cell;

use critical_section::Mutex;

/// Flags exchanged between the runtime and the step ISR.
///
/// Every access goes through a critical section, so a `static StepperLink`
/// can be shared by main code and interrupt handlers.
pub struct StepperLink {
    busy: Mutex<Cell<bool>>,
    stopped: Mutex<Cell<bool>>,
    halt_requested: Mutex<Cell<bool>>,
    load_requested: Mutex<Cell<bool>>,
    fault: Mutex<Cell<bool>>,
    kick: Mutex<Cell<Option<fn()>>>,
}

impl StepperLink {
    /// Idle link with no loader hook.
    pub const fn new() -> Self {
        Self {
            busy: Mutex::new(Cell::new(false)),
            stopped: Mutex::new(Cell::new(false)),
            halt_requested: Mutex::new(Cell::new(false)),
            load_requested: Mutex::new(Cell::new(false)),
            fault: Mutex::new(Cell::new(false)),
            kick: Mutex::new(Cell::new(None)),
        }
    }

    /// Install the hook that pends the loader software interrupt.
    pub fn set_kick(&self, kick: fn()) {
        critical_section::with(|cs| self.kick.borrow(cs).set(Some(kick)));
    }

    fn get(&self, cell: &Mutex<Cell<bool>>) -> bool {
        critical_section::with(|cs| cell.borrow(cs).get())
    }

    fn put(&self, cell: &Mutex<Cell<bool>>, value: bool) {
        critical_section::with(|cs| cell.borrow(cs).set(value));
    }

    fn take(&self, cell: &Mutex<Cell<bool>>) -> bool {
        critical_section::with(|cs| cell.borrow(cs).replace(false))
    }

    /// A segment is executing.
    pub fn is_busy(&self) -> bool {
        self.get(&self.busy)
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.put(&self.busy, busy);
    }

    /// Paused at a stop marker.
    pub fn is_stopped(&self) -> bool {
        self.get(&self.stopped)
    }

    pub(crate) fn set_stopped(&self, stopped: bool) {
        self.put(&self.stopped, stopped);
    }

    /// Ask the loader to fetch the next segment.
    pub fn request_load(&self) {
        let kick = critical_section::with(|cs| {
            self.load_requested.borrow(cs).set(true);
            self.kick.borrow(cs).get()
        });
        if let Some(kick) = kick {
            kick();
        }
    }

    /// Consume a pending load request.
    pub fn take_load_request(&self) -> bool {
        self.take(&self.load_requested)
    }

    /// Load request pending.
    pub fn load_pending(&self) -> bool {
        self.get(&self.load_requested)
    }

    /// Ask the ISR to stop immediately and discard queued segments.
    pub fn request_halt(&self) {
        self.put(&self.halt_requested, true);
        self.request_load();
    }

    /// Consume a pending halt request.
    pub fn take_halt_request(&self) -> bool {
        self.take(&self.halt_requested)
    }

    /// Halt request pending.
    pub fn halt_pending(&self) -> bool {
        self.get(&self.halt_requested)
    }

    /// Leave a stop marker pause.
    pub fn resume(&self) {
        if self.is_stopped() {
            self.set_stopped(false);
            self.request_load();
        }
    }

    pub(crate) fn set_fault(&self) {
        self.put(&self.fault, true);
    }

    /// Consume a hardware fault raised by the ISR.
    pub fn take_fault(&self) -> bool {
        self.take(&self.fault)
    }
}

impl Default for StepperLink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static KICKS: AtomicU32 = AtomicU32::new(0);

    fn kick() {
        KICKS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_load_request_calls_hook() {
        let link = StepperLink::new();
        link.set_kick(kick);
        let before = KICKS.load(Ordering::SeqCst);
        link.request_load();
        assert!(KICKS.load(Ordering::SeqCst) > before);
        assert!(link.take_load_request());
        assert!(!link.take_load_request());
    }

    #[test]
    fn test_resume_only_when_stopped() {
        let link = StepperLink::new();
        link.resume();
        assert!(!link.load_pending());
        link.set_stopped(true);
        link.resume();
        assert!(!link.is_stopped());
        assert!(link.load_pending());
    }

    #[test]
    fn test_halt_request() {
        let link = StepperLink::new();
        link.request_halt();
        assert!(link.take_halt_request());
        assert!(!link.halt_pending());
    }
}
