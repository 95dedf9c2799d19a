use serde::Serialize;

use crate::core::error::LauncherError;

/// User-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    AssetCorruption,
    NetworkUnreachable,
    FilesystemPermission,
    LoaderResolution,
    InstallerFailed,
    FailedToStart,
    PreparationFailed,
    Crash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub summary: &'static str,
    pub advice: &'static str,
}

impl ErrorKind {
    pub fn diagnosis(self) -> Diagnosis {
        let (summary, advice) = match self {
            ErrorKind::AssetCorruption => (
                "Game files are corrupted",
                "A cached index or profile could not be read. Launch again to re-download it, or delete the version folder and retry.",
            ),
            ErrorKind::NetworkUnreachable => (
                "Could not reach the download servers",
                "Check your internet connection, VPN and firewall, then try again.",
            ),
            ErrorKind::FilesystemPermission => (
                "The launcher could not write to the game folder",
                "Make sure the game directory is not read-only and is not locked by antivirus software, or pick another folder.",
            ),
            ErrorKind::LoaderResolution => (
                "No matching mod loader build was found",
                "Pick a different game version or loader version, and check that the loader supports this game version.",
            ),
            ErrorKind::InstallerFailed => (
                "The mod loader installer failed",
                "Make sure a working Java runtime is installed, then retry. Deleting cache/installers forces a fresh installer download.",
            ),
            ErrorKind::FailedToStart => (
                "The game process did not start",
                "Check that the selected Java runtime exists and matches the version this game needs.",
            ),
            ErrorKind::PreparationFailed => (
                "Launch preparation failed",
                "Check the log for details, then retry. Reinstalling the version usually clears this.",
            ),
            ErrorKind::Crash => (
                "The game closed unexpectedly",
                "Check the latest log or crash report in the game folder. Removing recently added mods often helps.",
            ),
        };
        Diagnosis { summary, advice }
    }
}

const JSON_PARSE_SIGNATURES: [&str; 6] = [
    "SyntaxError",
    "Unexpected token",
    "JsonSyntaxException",
    "MalformedJson",
    "parse error",
    "EOF while parsing",
];

const DNS_SIGNATURES: [&str; 5] = [
    "ENOTFOUND",
    "getaddrinfo",
    "UnknownHostException",
    "dns error",
    "failed to lookup address",
];

const PERMISSION_SIGNATURES: [&str; 4] = ["EACCES", "EPERM", "Permission denied", "Access is denied"];

/// Match raw backend text against known failure signatures, in fixed priority order.
pub fn classify(raw: &str) -> Option<ErrorKind> {
    if raw.contains("JSON") && JSON_PARSE_SIGNATURES.iter().any(|sig| raw.contains(sig)) {
        return Some(ErrorKind::AssetCorruption);
    }
    if DNS_SIGNATURES.iter().any(|sig| raw.contains(sig)) {
        return Some(ErrorKind::NetworkUnreachable);
    }
    if PERMISSION_SIGNATURES.iter().any(|sig| raw.contains(sig)) {
        return Some(ErrorKind::FilesystemPermission);
    }
    None
}

/// Category for an error that aborted preparation.
pub fn classify_error(err: &LauncherError) -> ErrorKind {
    if let Some(kind) = classify(&err.to_string()) {
        return kind;
    }
    match err {
        LauncherError::LoaderVersionUnavailable { .. } | LauncherError::LoaderApi(_) => {
            ErrorKind::LoaderResolution
        }
        LauncherError::InstallerFailed { .. } => ErrorKind::InstallerFailed,
        LauncherError::JavaExecution(_) | LauncherError::JavaNotFound(_) => ErrorKind::FailedToStart,
        _ => ErrorKind::PreparationFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_parse_needs_the_json_keyword() {
        assert_eq!(
            classify("SyntaxError: Unexpected token < in JSON at position 0"),
            Some(ErrorKind::AssetCorruption)
        );
        assert_eq!(classify("SyntaxError: missing ;"), None);
    }

    #[test]
    fn network_and_permission_signatures() {
        assert_eq!(
            classify("getaddrinfo ENOTFOUND resources.download.minecraft.net"),
            Some(ErrorKind::NetworkUnreachable)
        );
        assert_eq!(
            classify("EPERM: operation not permitted, open 'libraries/x.jar'"),
            Some(ErrorKind::FilesystemPermission)
        );
        assert_eq!(classify("[main] INFO Setting user: Steve"), None);
    }

    #[test]
    fn first_signature_in_priority_order_wins() {
        let raw = "JSON parse error after EACCES while reading index";
        assert_eq!(classify(raw), Some(ErrorKind::AssetCorruption));
    }

    #[test]
    fn errors_map_to_their_category() {
        let err = LauncherError::LoaderVersionUnavailable {
            loader: "forge".into(),
            game_version: "1.0".into(),
        };
        assert_eq!(classify_error(&err), ErrorKind::LoaderResolution);
        assert_eq!(
            classify_error(&LauncherError::InstallerFailed { code: Some(1) }),
            ErrorKind::InstallerFailed
        );
        assert_eq!(
            classify_error(&LauncherError::Other("dns error: failed to lookup address".into())),
            ErrorKind::NetworkUnreachable
        );
        assert_eq!(
            classify_error(&LauncherError::Other("boom".into())),
            ErrorKind::PreparationFailed
        );
    }

    #[test]
    fn every_kind_has_actionable_advice() {
        for kind in [
            ErrorKind::AssetCorruption,
            ErrorKind::NetworkUnreachable,
            ErrorKind::FilesystemPermission,
            ErrorKind::LoaderResolution,
            ErrorKind::InstallerFailed,
            ErrorKind::FailedToStart,
            ErrorKind::PreparationFailed,
            ErrorKind::Crash,
        ] {
            let diagnosis = kind.diagnosis();
            assert!(!diagnosis.summary.is_empty());
            assert!(!diagnosis.advice.is_empty());
        }
    }
}
