use std::collections::HashMap;

use log::warn;

use crate::{ContentId, LoadMode, SegmentHandle};

/// A segment instance bound on both sides of the translation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInstance {
    pub content: ContentId,
    pub session: SegmentHandle,
    pub local: SegmentHandle,
    pub mode: LoadMode,
}

/// A segment this peer knows is loaded locally, bound or not
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedSegment {
    pub local: SegmentHandle,
    pub content: ContentId,
    pub mode: LoadMode,
}

/// Bidirectional map between session handles (minted by the authority, the
/// only handles that go over the wire) and this peer's local handles.
///
/// The table never maps a local handle to two session handles or the other
/// way around: `bind` refuses to overwrite unless a session restore is in
/// progress, in which case stale pairs on either side are dropped first.
pub struct HandleTable {
    session_to_local: HashMap<SegmentHandle, SegmentHandle>,
    local_to_session: HashMap<SegmentHandle, SegmentHandle>,
    instances: HashMap<SegmentHandle, SegmentInstance>,
    tracked: Vec<TrackedSegment>,
    restoring: bool,
    next_session: u32,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            session_to_local: HashMap::new(),
            local_to_session: HashMap::new(),
            instances: HashMap::new(),
            tracked: Vec::new(),
            restoring: false,
            next_session: 1,
        }
    }

    // Translation

    /// Returns false, leaving the table untouched, if either handle is already
    /// bound (outside of restore mode) or if either is the sentinel
    pub fn bind(
        &mut self,
        session: SegmentHandle,
        local: SegmentHandle,
        content: ContentId,
        mode: LoadMode,
    ) -> bool {
        if session.is_none() || local.is_none() {
            warn!(
                "refusing to bind reserved sentinel handle: session {:?}, local {:?}",
                session, local
            );
            return false;
        }

        let session_taken = self.session_to_local.contains_key(&session);
        let local_taken = self.local_to_session.contains_key(&local);

        if session_taken || local_taken {
            if !self.restoring {
                return false;
            }

            // restoring: drop whatever stale pairs either side belongs to
            if let Some(old_local) = self.session_to_local.remove(&session) {
                self.local_to_session.remove(&old_local);
                self.instances.remove(&old_local);
            }
            if let Some(old_session) = self.local_to_session.remove(&local) {
                self.session_to_local.remove(&old_session);
                self.instances.remove(&local);
            }
        }

        self.session_to_local.insert(session, local);
        self.local_to_session.insert(local, session);
        self.instances.insert(
            local,
            SegmentInstance {
                content,
                session,
                local,
                mode,
            },
        );

        if session.value() >= self.next_session {
            self.next_session = session.value().wrapping_add(1);
        }

        true
    }

    /// Removes both directions and the instance record. Returns false, leaving
    /// the table untouched, unless `session` and `local` are bound to each other.
    pub fn unbind(&mut self, session: SegmentHandle, local: SegmentHandle) -> bool {
        let forward = self.session_to_local.get(&session).copied();
        let backward = self.local_to_session.get(&local).copied();

        if forward != Some(local) || backward != Some(session) {
            warn!(
                "cannot unbind session {:?} <-> local {:?}: found {:?} / {:?}",
                session, local, forward, backward
            );
            return false;
        }

        self.session_to_local.remove(&session);
        self.local_to_session.remove(&local);
        self.instances.remove(&local);
        true
    }

    pub fn session_to_local(&self, session: &SegmentHandle) -> Option<SegmentHandle> {
        self.session_to_local.get(session).copied()
    }

    pub fn local_to_session(&self, local: &SegmentHandle) -> Option<SegmentHandle> {
        self.local_to_session.get(local).copied()
    }

    pub fn instance(&self, local: &SegmentHandle) -> Option<&SegmentInstance> {
        self.instances.get(local)
    }

    pub fn bound_len(&self) -> usize {
        self.instances.len()
    }

    /// Mints a session handle above every handle bound so far, so a peer that
    /// takes over authority keeps extending the existing session handle space.
    /// Wraps past `u32::MAX`, skipping the sentinel and handles still bound.
    pub fn mint_session_handle(&mut self) -> SegmentHandle {
        loop {
            let handle = SegmentHandle::new(self.next_session);
            self.next_session = self.next_session.wrapping_add(1);
            if !handle.is_none() && !self.session_to_local.contains_key(&handle) {
                return handle;
            }
        }
    }

    // Restore mode

    /// Returns false if a restore is already in progress, restores never nest
    pub fn begin_restore(&mut self) -> bool {
        if self.restoring {
            return false;
        }
        self.restoring = true;
        true
    }

    pub fn end_restore(&mut self) {
        self.restoring = false;
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    // Local tracking

    pub fn track_local(&mut self, local: SegmentHandle, content: ContentId, mode: LoadMode) {
        if local.is_none() || self.is_tracked(&local) {
            return;
        }
        self.tracked.push(TrackedSegment {
            local,
            content,
            mode,
        });
    }

    pub fn untrack_local(&mut self, local: &SegmentHandle) -> bool {
        let Some(index) = self.tracked.iter().position(|tracked| tracked.local == *local) else {
            return false;
        };
        self.tracked.remove(index);
        true
    }

    pub fn is_tracked(&self, local: &SegmentHandle) -> bool {
        self.tracked.iter().any(|tracked| tracked.local == *local)
    }

    pub fn tracked(&self, local: &SegmentHandle) -> Option<&TrackedSegment> {
        self.tracked.iter().find(|tracked| tracked.local == *local)
    }

    /// Tracked segments in the order they were loaded
    pub fn tracked_segments(&self) -> impl Iterator<Item = &TrackedSegment> {
        self.tracked.iter()
    }

    /// First tracked segment of `content` that is not bound to a session handle
    pub fn find_unbound(&self, content: &ContentId) -> Option<SegmentHandle> {
        self.tracked
            .iter()
            .find(|tracked| {
                tracked.content == *content && !self.local_to_session.contains_key(&tracked.local)
            })
            .map(|tracked| tracked.local)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
