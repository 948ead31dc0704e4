//! The unified resource table: id allocator, typed lifecycle, reference
//! counting, and scoped cleanup (spec.md §3.1, §4.1).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::value::Value;

/// A resource id. Always positive for a live entry; negative values never
/// appear here — they're the ABI's error-code encoding on the wire, not an
/// id this table ever allocates.
pub type Rid = i32;

/// Which category of payload a resource holds. Kept separate from the
/// payload itself so `typeof`/`destroy` can answer without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Value,
    Request,
    HtmlDocument,
    HtmlNodes,
    CanvasContext,
    Image,
    Font,
    JsContext,
}

/// What's actually stored for a given rid.
pub enum ResourcePayload {
    Value(Value),
    Request(Box<dyn Any + Send + Sync>),
    /// Everything else (HTML documents/node sets, canvas contexts, images,
    /// fonts, JS contexts) is feature-gated in sibling crates, so the table
    /// itself stays generic over them via `Any`.
    Opaque(Box<dyn Any + Send + Sync>),
}

impl ResourcePayload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResourcePayload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_value_mut(&mut self) -> Option<&mut Value> {
        match self {
            ResourcePayload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            ResourcePayload::Request(b) | ResourcePayload::Opaque(b) => b.downcast_ref::<T>(),
            ResourcePayload::Value(_) => None,
        }
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            ResourcePayload::Request(b) | ResourcePayload::Opaque(b) => b.downcast_mut::<T>(),
            ResourcePayload::Value(_) => None,
        }
    }
}

struct Entry {
    payload: ResourcePayload,
    kind: ResourceKind,
    refcount: u32,
    created_at: Instant,
}

/// A process-local, per-plugin-instance mapping from rids to entries.
///
/// All methods take `&self` (interior mutability via a single `Mutex`)
/// because the table is shared between the dispatcher and every import
/// function a plugin call re-enters the host through.
pub struct ResourceTable {
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: Rid,
    entries: HashMap<Rid, Entry>,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { next_id: 1, entries: HashMap::new() }) }
    }

    /// Insert a new entry with refcount 1, returning its freshly allocated
    /// id. Ids are monotonically increasing and never reused (spec.md §3.1
    /// invariant iv).
    pub fn allocate(&self, payload: ResourcePayload, kind: ResourceKind) -> Rid {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(id, Entry { payload, kind, refcount: 1, created_at: Instant::now() });
        id
    }

    pub fn kind_of(&self, rid: Rid) -> Option<ResourceKind> {
        self.inner.lock().unwrap().entries.get(&rid).map(|e| e.kind)
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.inner.lock().unwrap().entries.contains_key(&rid)
    }

    /// Run `f` with read access to the stored value, if `rid` is live and
    /// holds a `Value` payload.
    pub fn with_value<R>(&self, rid: Rid, f: impl FnOnce(&Value) -> R) -> Option<R> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(&rid).and_then(|e| e.payload.as_value()).map(f)
    }

    pub fn with_value_mut<R>(&self, rid: Rid, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.get_mut(&rid).and_then(|e| e.payload.as_value_mut()).map(f)
    }

    pub fn with_payload<T: 'static, R>(&self, rid: Rid, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(&rid).and_then(|e| e.payload.downcast_ref::<T>()).map(f)
    }

    pub fn with_payload_mut<T: 'static, R>(&self, rid: Rid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.get_mut(&rid).and_then(|e| e.payload.downcast_mut::<T>()).map(f)
    }

    /// Replace the payload in place, keeping kind/refcount/age. Used to
    /// cache the encoded-bytes form of a value so `buffer_len` and the
    /// following `read_buffer` observe the same bytes (spec.md §4.1).
    pub fn update(&self, rid: Rid, payload: ResourcePayload) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&rid) {
            entry.payload = payload;
            true
        } else {
            false
        }
    }

    pub fn retain(&self, rid: Rid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&rid) {
            entry.refcount += 1;
            true
        } else {
            false
        }
    }

    /// Decrement the refcount; the entry disappears the instant it reaches
    /// zero (spec.md §8 property 2). Returns whether the rid was live
    /// before this call.
    pub fn release(&self, rid: Rid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.entries.get_mut(&rid) else { return false };
        if entry.refcount > 0 {
            entry.refcount -= 1;
        }
        if entry.refcount == 0 {
            inner.entries.remove(&rid);
        }
        true
    }

    /// Unconditional removal, ignoring refcount (spec.md §3.1 invariant iii).
    pub fn force_remove(&self, rid: Rid) -> bool {
        self.inner.lock().unwrap().entries.remove(&rid).is_some()
    }

    /// The single import-facing entry point for the plugin's unified
    /// `std.destroy`: looks up the kind, drops the entry regardless of
    /// kind, and reports whether it existed.
    pub fn destroy(&self, rid: Rid) -> bool {
        self.force_remove(rid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries no plugin has explicitly retained beyond the implicit
    /// reference `allocate` grants (refcount at its default of 1, i.e. the
    /// plugin never called `std.retain` on them) once they're older than
    /// `descriptor_age` — this is what reclaims rids a plugin allocated and
    /// simply forgot to `std.destroy` (spec.md §8 property/scenario S6).
    /// Remove `Request` entries older than `request_age` regardless of
    /// refcount. Entries a plugin has explicitly retained (refcount > 1)
    /// are never touched by age — only `force_remove`/`destroy` removes
    /// those, matching property 5. Then, if the population still exceeds
    /// the caps, evict the oldest un-retained entries until under cap
    /// (spec.md §4.1).
    pub fn sweep(&self, descriptor_age: std::time::Duration, request_age: std::time::Duration, descriptor_cap: usize, request_cap: usize) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let mut removed = 0;

        let stale: Vec<Rid> = inner
            .entries
            .iter()
            .filter(|(_, e)| {
                let age = now.duration_since(e.created_at);
                if matches!(e.kind, ResourceKind::Request) {
                    age >= request_age
                } else {
                    e.refcount <= 1 && age >= descriptor_age
                }
            })
            .map(|(rid, _)| *rid)
            .collect();
        for rid in stale {
            inner.entries.remove(&rid);
            removed += 1;
        }

        let request_count = inner.entries.values().filter(|e| matches!(e.kind, ResourceKind::Request)).count();
        if request_count > request_cap {
            let mut requests: Vec<(Rid, Instant)> = inner
                .entries
                .iter()
                .filter(|(_, e)| matches!(e.kind, ResourceKind::Request))
                .map(|(rid, e)| (*rid, e.created_at))
                .collect();
            requests.sort_by_key(|(_, created)| *created);
            for (rid, _) in requests.into_iter().take(request_count - request_cap) {
                inner.entries.remove(&rid);
                removed += 1;
            }
        }

        let descriptor_count = inner.entries.len();
        if descriptor_count > descriptor_cap {
            let mut unretained: Vec<(Rid, Instant)> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.refcount <= 1)
                .map(|(rid, e)| (*rid, e.created_at))
                .collect();
            unretained.sort_by_key(|(_, created)| *created);
            for (rid, _) in unretained.into_iter().take(descriptor_count - descriptor_cap) {
                inner.entries.remove(&rid);
                removed += 1;
            }
        }

        removed
    }
}

/// An rid lifetime guard active for one host-driven call. Tracks only the
/// rids it was explicitly asked to track; every one of them is released
/// when the scope is dropped or `finish` is called, on every exit path.
pub struct Scope<'t> {
    table: &'t ResourceTable,
    tracked: Vec<Rid>,
    finished: bool,
}

impl<'t> Scope<'t> {
    pub fn new(table: &'t ResourceTable) -> Self {
        Self { table, tracked: Vec::new(), finished: false }
    }

    /// Track an rid this scope owns. Panics (debug-asserts) if called after
    /// `finish` — a disposed scope must never accept new work.
    pub fn track(&mut self, rid: Rid) {
        assert!(!self.finished, "tracking on a disposed scope");
        self.tracked.push(rid);
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Release every tracked rid. Idempotent: calling this (or dropping the
    /// scope) twice is a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        for rid in self.tracked.drain(..) {
            self.table.force_remove(rid);
        }
        self.finished = true;
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn val(v: Value) -> ResourcePayload {
        ResourcePayload::Value(v)
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let table = ResourceTable::new();
        let a = table.allocate(val(Value::Null), ResourceKind::Value);
        let b = table.allocate(val(Value::Null), ResourceKind::Value);
        assert!(b > a);
        table.force_remove(a);
        let c = table.allocate(val(Value::Null), ResourceKind::Value);
        assert!(c > b);
        assert_ne!(c, a);
    }

    #[test]
    fn retain_release_balance() {
        let table = ResourceTable::new();
        let rid = table.allocate(val(Value::Int(1)), ResourceKind::Value);
        table.retain(rid);
        table.retain(rid);
        table.release(rid);
        table.release(rid);
        assert!(table.contains(rid), "refcount 1 after two retains and two releases");
        table.release(rid);
        assert!(!table.contains(rid), "entry disappears the instant refcount hits zero");
    }

    #[test]
    fn destroy_removes_any_kind() {
        let table = ResourceTable::new();
        let rid = table.allocate(val(Value::Bool(true)), ResourceKind::Value);
        assert!(table.destroy(rid));
        assert!(table.with_value(rid, |_| ()).is_none());
        assert!(!table.destroy(rid));
    }

    #[test]
    fn scope_releases_exactly_tracked_ids() {
        let table = ResourceTable::new();
        let a = table.allocate(val(Value::Null), ResourceKind::Value);
        let b = table.allocate(val(Value::Null), ResourceKind::Value);
        let untracked = table.allocate(val(Value::Null), ResourceKind::Value);
        {
            let mut scope = Scope::new(&table);
            scope.track(a);
            scope.track(b);
        }
        assert!(!table.contains(a));
        assert!(!table.contains(b));
        assert!(table.contains(untracked));
    }

    #[test]
    fn scope_finish_is_idempotent() {
        let table = ResourceTable::new();
        let a = table.allocate(val(Value::Null), ResourceKind::Value);
        let mut scope = Scope::new(&table);
        scope.track(a);
        scope.finish();
        scope.finish();
        assert!(!table.contains(a));
    }

    #[test]
    #[should_panic(expected = "disposed scope")]
    fn tracking_after_finish_panics() {
        let table = ResourceTable::new();
        let mut scope = Scope::new(&table);
        scope.finish();
        scope.track(1);
    }

    #[test]
    fn force_remove_ignores_refcount() {
        let table = ResourceTable::new();
        let rid = table.allocate(val(Value::Null), ResourceKind::Value);
        table.retain(rid);
        table.retain(rid);
        assert!(table.force_remove(rid));
        assert!(!table.contains(rid));
    }

    fn request() -> ResourcePayload {
        ResourcePayload::Request(Box::new(()))
    }

    #[test]
    fn sweep_evicts_aged_requests_regardless_of_refcount() {
        // `release` on a plain descriptor deletes it the instant refcount
        // hits zero, so the sweeper's age-based reaping is exercised by
        // request entries, which stay live across many host calls (init,
        // set_url, send, read_data, ...) without refcount ever reaching
        // zero through that API.
        let table = ResourceTable::new();
        let a = table.allocate(request(), ResourceKind::Request);
        let b = table.allocate(val(Value::Null), ResourceKind::Value); // unaffected by request_age

        let removed = table.sweep(Duration::from_secs(3600), Duration::from_secs(0), 10_000, 1_000);
        assert_eq!(removed, 1);
        assert!(!table.contains(a));
        assert!(table.contains(b));
    }

    #[test]
    fn sweep_enforces_request_population_cap() {
        let table = ResourceTable::new();
        for _ in 0..5 {
            table.allocate(request(), ResourceKind::Request);
        }
        assert_eq!(table.len(), 5);
        let removed = table.sweep(Duration::from_secs(3600), Duration::from_secs(3600), 10_000, 3);
        assert_eq!(removed, 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn sweep_leaves_explicitly_retained_descriptors_alone() {
        // A descriptor the plugin has actually retained (refcount > 1, an
        // explicit extra reference beyond the implicit one `allocate`
        // grants) is never reaped by age — only `force_remove`/`destroy`
        // removes those (spec.md §8 property 5).
        let table = ResourceTable::new();
        let rid = table.allocate(val(Value::Null), ResourceKind::Value);
        table.retain(rid);
        let removed = table.sweep(Duration::from_secs(0), Duration::from_secs(0), 10_000, 1_000);
        assert_eq!(removed, 0);
        assert!(table.contains(rid));
    }

    #[test]
    fn sweep_reclaims_unretained_descriptors_past_the_age_threshold() {
        // A descriptor a plugin allocated and simply never `std.destroy`ed
        // (refcount at its default of 1) is exactly the "leaked" case the
        // sweeper exists to reclaim (spec.md §8 scenario S6).
        let table = ResourceTable::new();
        let rid = table.allocate(val(Value::Null), ResourceKind::Value);
        let removed = table.sweep(Duration::from_secs(0), Duration::from_secs(0), 10_000, 1_000);
        assert_eq!(removed, 1);
        assert!(!table.contains(rid));
    }
}
