/// Every user-facing message of the application.
///
/// Text lives in [`super::display`]; call sites pass typed values only.
#[derive(Debug, Clone)]
pub enum Message {
    // === CONFIG MESSAGES ===
    ConfigSaved,
    ConfigHeader,
    PromptResourceId,
    PromptChannel,
    PromptCdk,
    PromptEndpoints,
    PromptRepositoryUrl,
    PromptProjectName,
    PromptShortName,
    PromptProxy,
    PromptInstallDir,
    PromptRelaunch,
    InvalidChannel(String),

    // === CHECK MESSAGES ===
    CheckingForUpdates(String),
    CheckSkipped(String),
    DebugVersionSuppressed(String),
    UpToDate(String),
    UpdateAvailable { current: String, latest: String },
    ReleaseFromPublicChannel,
    ReleaseNotesHeader,
    UpdateNotEntitled { version: String, code: i64, message: String },
    UpdateNoArtifact(String),

    // === DOWNLOAD MESSAGES ===
    DownloadStarting(String),
    DownloadProgress { downloaded: u64, total: u64, percent: f64, speed: u64 },
    DownloadCancelling,
    DownloadCancelled,
    DownloadCompleted(String),
    NoUpdateToDownload,

    // === INSTALL MESSAGES ===
    NoPendingUpdate,
    Installing(String),
    UpdateInstalled { version: String, mode: String },
    Relaunching,
    InstallerLaunched(u32),
    FallbackInstalled { path: String, cause: String },
    ConfirmUpdate(String),
    UpdateDeclined,

    // === STARTUP MESSAGES ===
    UpdateCompleted { previous: String, new: String },
    InstallerUnconfirmed { expected: String, running: String },
    PendingInstallReady { version: String, path: String },
    NothingPending,

    // === STATUS MESSAGES ===
    StatusHeader,
    StatusNoPending,
    StatusNever,

    // === ERROR MESSAGES ===
    StageFailed { stage: String, detail: String },
    RetryHint,
}
