use std::{
    fs::OpenOptions,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;
use uuid::Uuid;

use super::SessionError;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
    /// The platform has to ask the user.
    Undetermined,
}

/// Platform hook for the one-shot storage-access check.
pub trait Authorizer: Send + Sync + 'static {
    /// Current answer, without prompting.
    fn check(&self) -> Authorization;

    /// Starts a prompt. `reply` resolves once with the user's answer; dropping
    /// it counts as a denial.
    fn request(&self, reply: oneshot::Sender<bool>);
}

/// Desktop platforms need no prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl Authorizer for AlwaysGranted {
    fn check(&self) -> Authorization {
        Authorization::Granted
    }

    fn request(&self, reply: oneshot::Sender<bool>) {
        let _ = reply.send(true);
    }
}

/// Grants access when a file can be created in the database directory,
/// creating the directory first if needed.
#[derive(Debug, Clone)]
pub struct StorageAccess {
    dir: PathBuf,
}

impl StorageAccess {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Authorizer for StorageAccess {
    fn check(&self) -> Authorization {
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            log_warn!("cannot create {}: {err}", self.dir.display());
            return Authorization::Denied;
        }

        let scratch = self.dir.join(format!(".notepage-{}", Uuid::new_v4()));
        match OpenOptions::new().write(true).create_new(true).open(&scratch) {
            Ok(file) => {
                drop(file);
                let _ = std::fs::remove_file(&scratch);
                Authorization::Granted
            }
            Err(err) => {
                log_warn!("cannot write to {}: {err}", self.dir.display());
                Authorization::Denied
            }
        }
    }

    fn request(&self, reply: oneshot::Sender<bool>) {
        let _ = reply.send(self.check() == Authorization::Granted);
    }
}

enum GateState {
    Unknown,
    /// `prompt` identifies the open prompt; answers to older prompts are ignored.
    Pending {
        prompt: u64,
        waiters: Vec<oneshot::Sender<bool>>,
    },
    Granted,
    Denied,
}

struct GateInner {
    state: GateState,
    prompts: u64,
}

/// Must pass before a session issues its first command. A grant is remembered
/// for the life of the gate; a denial is too, until [`Gate::reset`].
#[derive(Clone)]
pub struct Gate {
    authorizer: Arc<dyn Authorizer>,
    inner: Arc<Mutex<GateInner>>,
}

impl Gate {
    pub fn new(authorizer: impl Authorizer) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            inner: Arc::new(Mutex::new(GateInner {
                state: GateState::Unknown,
                prompts: 0,
            })),
        }
    }

    pub fn always_granted() -> Self {
        Self::new(AlwaysGranted)
    }

    /// Resolves once with the grant decision, prompting at most once no
    /// matter how many callers wait concurrently.
    pub async fn authorize(&self) -> Result<(), SessionError> {
        let (waiter, prompt) = {
            let mut inner = lock(&self.inner);
            match &mut inner.state {
                GateState::Granted => return Ok(()),
                GateState::Denied => return Err(SessionError::AuthorizationDenied),
                GateState::Pending { waiters, .. } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    (rx, None)
                }
                GateState::Unknown => match self.authorizer.check() {
                    Authorization::Granted => {
                        inner.state = GateState::Granted;
                        return Ok(());
                    }
                    Authorization::Denied => {
                        inner.state = GateState::Denied;
                        log_warn!("storage access denied");
                        return Err(SessionError::AuthorizationDenied);
                    }
                    Authorization::Undetermined => {
                        let (tx, rx) = oneshot::channel();
                        inner.prompts += 1;
                        let prompt = inner.prompts;
                        inner.state = GateState::Pending {
                            prompt,
                            waiters: vec![tx],
                        };
                        (rx, Some(prompt))
                    }
                },
            }
        };

        if let Some(prompt) = prompt {
            self.prompt(prompt);
        }

        match waiter.await {
            Ok(true) => Ok(()),
            _ => Err(SessionError::AuthorizationDenied),
        }
    }

    /// Callback form: runs `callback` right away when access is already
    /// granted, otherwise once later if the prompt is granted. A denial never
    /// runs it. Needs a tokio runtime when a prompt is required.
    pub fn ensure_authorized<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_granted() {
            callback();
            return;
        }

        let gate = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if gate.authorize().await.is_ok() {
                        callback();
                    }
                });
            }
            Err(_) => log_error!("authorization requested outside a tokio runtime"),
        }
    }

    pub fn is_granted(&self) -> bool {
        let mut inner = lock(&self.inner);
        if matches!(inner.state, GateState::Unknown)
            && self.authorizer.check() == Authorization::Granted
        {
            inner.state = GateState::Granted;
        }
        matches!(inner.state, GateState::Granted)
    }

    /// Forgets the previous decision so the next `authorize` checks again.
    /// Pending waiters resolve as denied, and an answer to a prompt opened
    /// before the reset is ignored.
    pub fn reset(&self) {
        lock(&self.inner).state = GateState::Unknown;
    }

    fn prompt(&self, prompt: u64) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.authorizer.request(reply_tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let granted = reply_rx.await.unwrap_or(false);
            let waiters = {
                let mut guard = lock(&inner);
                match &mut guard.state {
                    GateState::Pending {
                        prompt: current,
                        waiters,
                    } if *current == prompt => {
                        let waiters = std::mem::take(waiters);
                        guard.state = if granted {
                            GateState::Granted
                        } else {
                            GateState::Denied
                        };
                        waiters
                    }
                    _ => {
                        log_info!("ignoring answer to stale storage prompt {prompt}");
                        return;
                    }
                }
            };

            log_info!(
                "storage access {}",
                if granted { "granted" } else { "denied" }
            );
            for waiter in waiters {
                let _ = waiter.send(granted);
            }
        });
    }
}

fn lock(inner: &Mutex<GateInner>) -> MutexGuard<'_, GateInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Always undetermined; holds replies until the test answers them, oldest first.
    #[derive(Clone, Default)]
    struct Prompt {
        pending: Arc<Mutex<Vec<oneshot::Sender<bool>>>>,
        prompts: Arc<AtomicUsize>,
    }

    impl Prompt {
        fn answer(&self, granted: bool) {
            let mut pending = self.pending.lock().unwrap();
            assert!(!pending.is_empty(), "no prompt open");
            pending.remove(0).send(granted).unwrap();
        }
    }

    impl Authorizer for Prompt {
        fn check(&self) -> Authorization {
            Authorization::Undetermined
        }

        fn request(&self, reply: oneshot::Sender<bool>) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().unwrap().push(reply);
        }
    }

    struct Refuse;

    impl Authorizer for Refuse {
        fn check(&self) -> Authorization {
            Authorization::Denied
        }

        fn request(&self, _reply: oneshot::Sender<bool>) {}
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn granted_runs_callback_synchronously() {
        let gate = Gate::always_granted();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        gate.ensure_authorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn denial_never_runs_callback_and_sticks() {
        let gate = Gate::new(Refuse);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        gate.ensure_authorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(gate.authorize().await, Err(SessionError::AuthorizationDenied));
    }

    #[tokio::test]
    async fn prompt_grant_fires_callback_exactly_once() {
        let prompt = Prompt::default();
        let gate = Gate::new(prompt.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        gate.ensure_authorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        prompt.answer(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(gate.is_granted());
        assert!(gate.authorize().await.is_ok());
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_one_prompt() {
        let prompt = Prompt::default();
        let gate = Gate::new(prompt.clone());

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        let second = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        settle().await;

        prompt.answer(false);
        assert_eq!(first.await.unwrap(), Err(SessionError::AuthorizationDenied));
        assert_eq!(second.await.unwrap(), Err(SessionError::AuthorizationDenied));
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_allows_a_new_prompt() {
        let prompt = Prompt::default();
        let gate = Gate::new(prompt.clone());

        let attempt = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        settle().await;
        prompt.answer(false);
        assert!(attempt.await.unwrap().is_err());

        gate.reset();
        let attempt = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        settle().await;
        prompt.answer(true);
        assert!(attempt.await.unwrap().is_ok());
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn answer_to_prompt_from_before_reset_is_ignored() {
        let prompt = Prompt::default();
        let gate = Gate::new(prompt.clone());

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        settle().await;

        gate.reset();
        let second = tokio::spawn({
            let gate = gate.clone();
            async move { gate.authorize().await }
        });
        settle().await;
        assert_eq!(first.await.unwrap(), Err(SessionError::AuthorizationDenied));
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 2);

        // Answers the prompt opened before the reset.
        prompt.answer(true);
        settle().await;
        assert!(!second.is_finished());
        assert!(!gate.is_granted());

        prompt.answer(false);
        assert_eq!(second.await.unwrap(), Err(SessionError::AuthorizationDenied));
        assert_eq!(gate.authorize().await, Err(SessionError::AuthorizationDenied));
    }

    #[test]
    fn storage_access_grants_writable_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let access = StorageAccess::new(dir.path().join("LocalNative"));
        assert_eq!(access.check(), Authorization::Granted);
        assert_eq!(std::fs::read_dir(dir.path().join("LocalNative")).unwrap().count(), 0);
    }

    #[test]
    fn storage_access_denies_when_dir_cannot_be_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(StorageAccess::new(file.join("db")).check(), Authorization::Denied);
    }

    #[cfg(unix)]
    #[test]
    fn storage_access_follows_actual_writability() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users can still write here, so compare with a real attempt.
        let writable = std::fs::write(locked.join("attempt"), b"").is_ok();
        let _ = std::fs::remove_file(locked.join("attempt"));
        let expected = if writable {
            Authorization::Granted
        } else {
            Authorization::Denied
        };
        assert_eq!(StorageAccess::new(&locked).check(), expected);

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
