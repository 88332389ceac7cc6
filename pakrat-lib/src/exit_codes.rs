//! Installer exit-code knowledge table
//!
//! Exit codes follow MSI, MSU, NSIS and InnoSetup conventions:
//! NSIS - http://nsis.sourceforge.net/Docs/AppendixD.html
//! InnoSetup - http://www.jrsoftware.org/ishelp/index.php?topic=setupexitcodes
//! MSI - https://msdn.microsoft.com/en-us/library/windows/desktop/aa376931.aspx

/// Exit codes that indicate success without further interpretation.
pub const WELL_KNOWN_SUCCESS: [i32; 5] = [0, 1605, 1614, 1641, 3010];

/// Classification of an installer exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCodeClassification {
    Success,
    /// Succeeded, but a reboot is required to complete the installation.
    SuccessWithReboot,
    /// Non-fatal, but worth surfacing to the user.
    Warning(&'static str),
    Fatal(&'static str),
    /// Not present in the knowledge table.
    Unknown,
}

/// Human-readable reason for a known installer exit code, or `None` for
/// codes the table has nothing to say about.
pub fn reason(exit_code: i32) -> Option<&'static str> {
    let reason = match exit_code {
        0 | 1 | 3010 => return None,
        2 => "Setup was cancelled.",
        3 => "A fatal error occurred when preparing or moving to next install phase. Check to be sure you have enough memory to perform an installation and try again.",
        4 => "A fatal error occurred during installation process.",
        5 => "User (you) cancelled the installation.",
        6 => "Setup process was forcefully terminated by the debugger.",
        7 => "While preparing to install, it was determined setup cannot proceed with the installation. Please be sure the software can be installed on your system.",
        8 => "While preparing to install, it was determined setup cannot proceed with the installation until you restart the system. Please reboot and try again.",
        1602 => "User (you) cancelled the installation.",
        1603 => "Generic MSI Error. This is a local environment error, not an issue with a package or the MSI itself - it could mean a pending reboot is necessary prior to install or something else (like the same version is already installed). Please see MSI log if available.",
        1618 => "Another installation currently in progress. Try again later.",
        1619 => "MSI could not be found - it is possibly corrupt or not an MSI at all. If it was downloaded and the MSI is less than 30K, try opening it in an editor like Notepad++ as it is likely HTML.",
        1620 => "MSI could not be opened - it is possibly corrupt or not an MSI at all. If it was downloaded and the MSI is less than 30K, try opening it in an editor like Notepad++ as it is likely HTML.",
        1622 => "Something is wrong with the install log location specified. Please fix this in the package silent arguments (or in install arguments you specified). The directory specified as part of the log file path must exist for an MSI to be able to log to that directory.",
        1623 => "This MSI has a language that is not supported by your system. Contact package maintainer(s) if there is an install available in your language and you would like it added to the packaging.",
        1625 => "Installation of this MSI is forbidden by system policy. Please contact your system administrators.",
        1632 | 1633 => "Installation of this MSI is not supported on this platform. Contact package maintainer(s) if you feel this is in error or if you need an architecture that is not available with the current packaging.",
        1638 => "This MSI requires uninstall prior to installing a different version. Please ask the package maintainer(s) to add a check in the install script and uninstall if the software is installed.",
        1639 => "The command line arguments passed to the MSI are incorrect. If you passed in additional arguments, please adjust. Otherwise followup with the package maintainer(s) to get this fixed.",
        1640 | 1645 => "Cannot install MSI when running from remote desktop (terminal services). You may need to run change.exe prior to installing or not use terminal services.",
        _ => return None,
    };

    Some(reason)
}

/// Classify an installer exit code against the knowledge table.
pub fn classify(exit_code: i32) -> ExitCodeClassification {
    match exit_code {
        0 | 1605 | 1614 => ExitCodeClassification::Success,
        1641 | 3010 => ExitCodeClassification::SuccessWithReboot,
        2 | 5 | 1602 => ExitCodeClassification::Warning(
            reason(exit_code).unwrap_or("Installation was cancelled."),
        ),
        code => match reason(code) {
            Some(r) => ExitCodeClassification::Fatal(r),
            None => ExitCodeClassification::Unknown,
        },
    }
}
