/// Scripted segment loader for E2E testing
/// Hands out local handles from a per-peer range and lets tests delay,
/// hold back or fail engine work.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use scenesync_shared::{
    AsyncSegmentOp, AsyncStatus, LoadMode, LoaderError, SegmentHandle, SegmentInfo, SegmentLoader,
};

#[derive(Default)]
struct LoaderState {
    next_local: u32,
    delay: u32,
    held: bool,
    failing: HashSet<String>,
    rejecting: HashSet<String>,
    loads: Vec<(String, LoadMode)>,
    unloads: Vec<SegmentHandle>,
    loaded: Vec<SegmentHandle>,
}

/// Cloning shares the underlying state, so a test keeps one clone to steer
/// the loader it handed to a coordinator
#[derive(Clone)]
pub struct TestLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl TestLoader {
    /// Local handles are handed out counting up from `first_local`
    pub fn new(first_local: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoaderState {
                next_local: first_local,
                ..Default::default()
            })),
        }
    }

    pub fn boxed(&self) -> Box<dyn SegmentLoader> {
        Box::new(self.clone())
    }

    /// Number of polls each new operation reports `Pending` before finishing
    pub fn set_delay(&self, polls: u32) {
        self.state.lock().unwrap().delay = polls;
    }

    /// Every operation, started or not, stays `Pending` until `release()`
    pub fn hold(&self) {
        self.state.lock().unwrap().held = true;
    }

    pub fn release(&self) {
        self.state.lock().unwrap().held = false;
    }

    /// Loads of `name` start, then report `Failed`
    pub fn fail_load(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    /// Loads of `name` are refused up front
    pub fn reject_load(&self, name: &str) {
        self.state.lock().unwrap().rejecting.insert(name.to_string());
    }

    /// Every load started so far, in order
    pub fn loads(&self) -> Vec<(String, LoadMode)> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn load_names(&self) -> Vec<String> {
        self.loads().into_iter().map(|(name, _)| name).collect()
    }

    pub fn unloads(&self) -> Vec<SegmentHandle> {
        self.state.lock().unwrap().unloads.clone()
    }

    /// Local handles the engine currently has loaded
    pub fn loaded(&self) -> Vec<SegmentHandle> {
        self.state.lock().unwrap().loaded.clone()
    }
}

impl SegmentLoader for TestLoader {
    fn begin_load(
        &mut self,
        segment: &SegmentInfo,
        mode: LoadMode,
    ) -> Result<Box<dyn AsyncSegmentOp>, LoaderError> {
        let mut state = self.state.lock().unwrap();
        if state.rejecting.contains(&segment.name) {
            return Err(LoaderError::LoadRejected {
                name: segment.name.clone(),
                reason: "rejected by test".to_string(),
            });
        }

        state.loads.push((segment.name.clone(), mode));
        let outcome = if state.failing.contains(&segment.name) {
            AsyncStatus::Failed(format!("{} failed to load", segment.name))
        } else {
            let local = SegmentHandle::new(state.next_local);
            state.next_local += 1;
            AsyncStatus::Loaded(local)
        };

        Ok(Box::new(TestOp {
            state: self.state.clone(),
            remaining: state.delay,
            outcome,
            single: mode == LoadMode::Single,
            unloading: None,
        }))
    }

    fn begin_unload(&mut self, local: SegmentHandle) -> Result<Box<dyn AsyncSegmentOp>, LoaderError> {
        let mut state = self.state.lock().unwrap();
        state.unloads.push(local);

        Ok(Box::new(TestOp {
            state: self.state.clone(),
            remaining: state.delay,
            outcome: AsyncStatus::Unloaded,
            single: false,
            unloading: Some(local),
        }))
    }
}

struct TestOp {
    state: Arc<Mutex<LoaderState>>,
    remaining: u32,
    outcome: AsyncStatus,
    single: bool,
    unloading: Option<SegmentHandle>,
}

impl AsyncSegmentOp for TestOp {
    fn poll(&mut self) -> AsyncStatus {
        let mut state = self.state.lock().unwrap();
        if state.held {
            return AsyncStatus::Pending;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return AsyncStatus::Pending;
        }

        match &self.outcome {
            AsyncStatus::Loaded(local) => {
                if self.single {
                    state.loaded.clear();
                }
                if !state.loaded.contains(local) {
                    state.loaded.push(*local);
                }
            }
            AsyncStatus::Unloaded => {
                if let Some(local) = self.unloading {
                    state.loaded.retain(|loaded| *loaded != local);
                }
            }
            _ => {}
        }
        self.outcome.clone()
    }
}
