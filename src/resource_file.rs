//! # Opened Resource Files and the Context Stack
//!
//! An [`OpenedResourceFile`] pairs one [`OpenedFile`] with the
//! [`ResourceDirectory`] parsed from it and answers typed lookups.
//!
//! Legacy callers expect a single ambient "current resource file". That state
//! lives in a [`ResourceContext`]: an explicit stack object, plus one ambient
//! instance per thread reached through [`OpenedResourceFile::push`],
//! [`OpenedResourceFile::pop`], [`current_check`] and [`current_get`]. Saved
//! entries share the fork with the file that pushed them, so closing that file
//! makes the saved entry answer "closed" instead of dangling.
//!
//! None of this is `Send`: the ambient context must stay on the thread that
//! owns it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::codec::{locate_resource_fork, ResType, ResourceDirectory, ResourceEntry};
use crate::error::{FileError, LastError, Result};
use crate::loaded::LoadedResource;
use crate::opened_file::OpenedFile;

struct ForkState {
    file: OpenedFile,
    directory: ResourceDirectory,
}

type SharedFork = Rc<RefCell<Option<ForkState>>>;

fn check_in(fork: &SharedFork, kind: ResType, id: i16) -> bool {
    fork.borrow().as_ref().is_some_and(|s| s.directory.contains(kind, id))
}

fn get_in(fork: &SharedFork, kind: ResType, id: i16, out: &mut LoadedResource) -> Result<()> {
    let mut guard = fork.borrow_mut();
    let state = guard.as_mut().ok_or(FileError::InvalidState("resource file is closed"))?;
    let entry = state.directory.entry(kind, id).ok_or(FileError::NotPresent { kind, id })?;
    let (offset, length) = (entry.offset, entry.length as usize);
    let mut buf = vec![0u8; length];
    state.file.set_position(offset)?;
    state.file.read(&mut buf)?;
    out.set_data(buf);
    Ok(())
}

/// A stack of previously current resource files.
pub struct ResourceContext {
    current: Option<SharedFork>,
    saved: Vec<Option<SharedFork>>,
    load_enabled: bool,
}

impl Default for ResourceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceContext {
    /// Empty stack, no current file.
    pub fn new() -> Self {
        Self { current: None, saved: Vec::new(), load_enabled: true }
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_current(&self, file: &OpenedResourceFile) -> bool {
        match (&self.current, &file.fork) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn load_enabled(&self) -> bool {
        self.load_enabled
    }

    pub fn set_load_enabled(&mut self, enabled: bool) {
        self.load_enabled = enabled;
    }

    /// Saves the current file (possibly none) and makes `file` current.
    /// Always leaves loading enabled.
    pub fn push(&mut self, file: &OpenedResourceFile) -> Result<()> {
        let fork = file.fork.clone().ok_or(FileError::InvalidState("resource file is closed"))?;
        self.saved.push(self.current.replace(fork));
        self.load_enabled = true;
        debug!(depth = self.saved.len(), "pushed resource context");
        Ok(())
    }

    /// Restores the most recently saved file.
    pub fn pop(&mut self) -> Result<()> {
        let previous = self.saved.pop().ok_or(FileError::InvalidState("resource context stack is empty"))?;
        self.current = previous;
        debug!(depth = self.saved.len(), "popped resource context");
        Ok(())
    }

    pub fn check(&self, kind: ResType, id: i16) -> bool {
        self.current.as_ref().is_some_and(|f| check_in(f, kind, id))
    }

    pub fn get(&self, kind: ResType, id: i16, out: &mut LoadedResource) -> Result<()> {
        let fork = self.current.as_ref().ok_or(FileError::InvalidState("no current resource file"))?;
        if !self.load_enabled {
            return Err(FileError::InvalidState("resource loading is disabled"));
        }
        get_in(fork, kind, id, out)
    }
}

impl Drop for ResourceContext {
    fn drop(&mut self) {
        if !self.saved.is_empty() {
            warn!(depth = self.saved.len(), "resource context dropped with unbalanced pushes; forcing pops");
            while self.pop().is_ok() {}
        }
    }
}

thread_local! {
    static AMBIENT: RefCell<ResourceContext> = RefCell::new(ResourceContext::new());
}

/// Runs `f` against this thread's ambient context.
pub fn with_ambient<R>(f: impl FnOnce(&mut ResourceContext) -> R) -> R {
    AMBIENT.with(|ctx| f(&mut ctx.borrow_mut()))
}

/// Whether the ambient current file holds (`kind`, `id`).
pub fn current_check(kind: ResType, id: i16) -> bool {
    with_ambient(|ctx| ctx.check(kind, id))
}

/// Loads (`kind`, `id`) from the ambient current file.
pub fn current_get(kind: ResType, id: i16, out: &mut LoadedResource) -> Result<()> {
    with_ambient(|ctx| ctx.get(kind, id, out))
}

/// A resource fork opened for typed lookups. Closed automatically on drop.
pub struct OpenedResourceFile {
    fork: Option<SharedFork>,
    last_error: LastError,
}

impl Default for OpenedResourceFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpenedResourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedResourceFile")
            .field("open", &self.is_open())
            .field("resources", &self.with_directory(ResourceDirectory::len).unwrap_or(0))
            .finish()
    }
}

impl OpenedResourceFile {
    /// A closed handle.
    pub fn new() -> Self {
        Self { fork: None, last_error: LastError::default() }
    }

    /// Locates the resource fork inside `file` and indexes it.
    pub fn from_opened_file(mut file: OpenedFile) -> Result<Self> {
        let window = locate_resource_fork(&mut file)?;
        file.set_fork_window(window)?;
        let directory = ResourceDirectory::parse(&mut file)?;
        debug!(path = %file.origin().display(), resources = directory.len(), "opened resource file");
        Ok(Self {
            fork: Some(Rc::new(RefCell::new(Some(ForkState { file, directory })))),
            last_error: LastError::default(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.fork.as_ref().is_some_and(|f| f.borrow().is_some())
    }

    pub fn last_error(&self) -> LastError {
        self.last_error
    }

    /// Releases the file and drops the directory. Contexts that saved this
    /// file see it as closed from now on.
    pub fn close(&mut self) -> Result<()> {
        let Some(fork) = self.fork.take() else {
            return Ok(());
        };
        let state = fork.borrow_mut().take();
        let result = match state {
            Some(mut s) => s.file.close(),
            None => Ok(()),
        };
        self.last_error.track(result)
    }

    pub fn check(&self, kind: ResType, id: i16) -> bool {
        self.fork.as_ref().is_some_and(|f| check_in(f, kind, id))
    }

    /// Reads (`kind`, `id`) into `out`. On any failure `out` is untouched.
    pub fn get(&mut self, kind: ResType, id: i16, out: &mut LoadedResource) -> Result<()> {
        let result = match &self.fork {
            None => Err(FileError::InvalidState("resource file is closed")),
            Some(fork) => get_in(fork, kind, id, out),
        };
        self.last_error.track(result)
    }

    fn with_directory<R>(&self, f: impl FnOnce(&ResourceDirectory) -> R) -> Option<R> {
        let fork = self.fork.as_ref()?;
        let guard = fork.borrow();
        guard.as_ref().map(|s| f(&s.directory))
    }

    pub fn types(&self) -> Vec<ResType> {
        self.with_directory(ResourceDirectory::types).unwrap_or_default()
    }

    pub fn ids(&self, kind: ResType) -> Vec<i16> {
        self.with_directory(|d| d.ids(kind)).unwrap_or_default()
    }

    pub fn count(&self, kind: ResType) -> usize {
        self.with_directory(|d| d.count(kind)).unwrap_or(0)
    }

    pub fn name(&self, kind: ResType, id: i16) -> Option<String> {
        self.with_directory(|d| d.name(kind, id).map(str::to_string)).flatten()
    }

    pub fn entry(&self, kind: ResType, id: i16) -> Option<ResourceEntry> {
        self.with_directory(|d| d.entry(kind, id).cloned()).flatten()
    }

    pub fn push_onto(&mut self, ctx: &mut ResourceContext) -> Result<()> {
        let result = ctx.push(self);
        self.last_error.track(result)
    }

    pub fn pop_from(&mut self, ctx: &mut ResourceContext) -> Result<()> {
        if !ctx.is_current(self) {
            warn!("popping a resource context that this file did not push");
        }
        let result = ctx.pop();
        self.last_error.track(result)
    }

    /// Makes this file the thread's current resource file.
    pub fn push(&mut self) -> Result<()> {
        let result = with_ambient(|ctx| ctx.push(self));
        self.last_error.track(result)
    }

    /// Restores the thread's previous current resource file.
    pub fn pop(&mut self) -> Result<()> {
        let result = with_ambient(|ctx| {
            if !ctx.is_current(self) {
                warn!("popping a resource context that this file did not push");
            }
            ctx.pop()
        });
        self.last_error.track(result)
    }

    /// Runs `f` with this file current, restoring the previous one on every exit path.
    pub fn with_pushed<R>(&mut self, f: impl FnOnce() -> R) -> Result<R> {
        self.push()?;
        scopeguard::defer! {
            let _ = with_ambient(|ctx| ctx.pop());
        }
        Ok(f())
    }
}

impl Drop for OpenedResourceFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ResourceBuilder;
    use crate::error::ErrorCode;

    const SND: ResType = ResType::new(*b"SND1");
    const TEXT: ResType = ResType::new(*b"TEXT");

    fn container(entries: &[(ResType, i16, &[u8])]) -> OpenedResourceFile {
        let mut b = ResourceBuilder::new();
        for (kind, id, data) in entries {
            b.add(*kind, *id, data.to_vec());
        }
        OpenedResourceFile::from_opened_file(OpenedFile::in_memory(b.to_bytes().unwrap())).unwrap()
    }

    #[test]
    fn get_miss_leaves_output_untouched() {
        let mut f = container(&[(SND, 1, b"x")]);
        let mut out = LoadedResource::from(vec![42]);
        let err = f.get(SND, 2, &mut out).unwrap_err();
        assert!(matches!(err, FileError::NotPresent { id: 2, .. }));
        assert_eq!(f.last_error().code(), Some(ErrorCode::NotPresent));
        assert_eq!(out.as_slice().unwrap(), &[42]);
    }

    #[test]
    fn debug_shows_open_state_and_size() {
        let mut f = container(&[(SND, 1, b"x"), (TEXT, 2, b"y")]);
        assert_eq!(format!("{f:?}"), "OpenedResourceFile { open: true, resources: 2 }");
        f.close().unwrap();
        assert_eq!(format!("{f:?}"), "OpenedResourceFile { open: false, resources: 0 }");
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut a = container(&[(TEXT, 1, b"from a")]);
        let mut b = container(&[(TEXT, 2, b"from b")]);
        let mut ctx = ResourceContext::new();
        assert!(!ctx.has_current());

        a.push_onto(&mut ctx).unwrap();
        b.push_onto(&mut ctx).unwrap();
        assert!(ctx.check(TEXT, 2));
        assert!(!ctx.check(TEXT, 1));

        b.pop_from(&mut ctx).unwrap();
        assert!(ctx.is_current(&a));
        assert!(ctx.check(TEXT, 1));
        assert!(!ctx.check(TEXT, 2));
        let mut out = LoadedResource::new();
        ctx.get(TEXT, 1, &mut out).unwrap();
        assert_eq!(out.as_slice().unwrap(), b"from a");

        a.pop_from(&mut ctx).unwrap();
        assert!(!ctx.has_current());
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.pop().is_err());
    }

    #[test]
    fn push_reenables_loading() {
        let a = container(&[(SND, 1, b"s")]);
        let mut ctx = ResourceContext::new();
        ctx.set_load_enabled(false);
        ctx.push(&a).unwrap();
        assert!(ctx.load_enabled());
        ctx.pop().unwrap();
    }

    #[test]
    fn disabled_loading_refuses_get() {
        let a = container(&[(SND, 1, b"s")]);
        let mut ctx = ResourceContext::new();
        ctx.push(&a).unwrap();
        ctx.set_load_enabled(false);
        let mut out = LoadedResource::new();
        assert!(matches!(ctx.get(SND, 1, &mut out), Err(FileError::InvalidState(_))));
        assert!(!out.is_loaded());
        ctx.pop().unwrap();
    }

    #[test]
    fn closing_a_pushed_file_invalidates_its_entry() {
        let mut a = container(&[(SND, 1, b"s")]);
        let mut ctx = ResourceContext::new();
        ctx.push(&a).unwrap();
        a.close().unwrap();
        a.close().unwrap();
        assert!(!a.is_open());
        assert!(!ctx.check(SND, 1));
        let mut out = LoadedResource::new();
        assert!(matches!(ctx.get(SND, 1, &mut out), Err(FileError::InvalidState(_))));
        ctx.pop().unwrap();
        assert!(ctx.push(&a).is_err());
    }

    #[test]
    fn dropping_unbalanced_context_forces_pops() {
        let a = container(&[(SND, 1, b"s")]);
        let mut ctx = ResourceContext::new();
        ctx.push(&a).unwrap();
        ctx.push(&a).unwrap();
        drop(ctx);
        assert!(a.is_open());
    }

    #[test]
    fn with_pushed_restores_after_failure() {
        let mut outer = container(&[(TEXT, 1, b"outer")]);
        let mut shared = container(&[(TEXT, 128, b"shared")]);
        outer.push().unwrap();

        let result: Result<Result<()>> = shared.with_pushed(|| {
            assert!(current_check(TEXT, 128));
            let mut out = LoadedResource::new();
            current_get(TEXT, 999, &mut out)
        });
        assert!(matches!(result, Ok(Err(FileError::NotPresent { .. }))));

        assert!(current_check(TEXT, 1));
        assert!(!current_check(TEXT, 128));
        outer.pop().unwrap();
        assert!(!current_check(TEXT, 1));
        assert_eq!(with_ambient(|ctx| ctx.depth()), 0);
    }
}
