use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const CODESIGN: &str = "codesign";

/// Re-signs shadow copies on macOS. A copied dylib keeps the signature of the
/// canonical binary, which the loader rejects on Apple Silicon once the path changes.
#[derive(Debug)]
pub(crate) struct CodeSigner {
    available: bool,
}

impl CodeSigner {
    pub(crate) fn new() -> Self {
        let available = match run(Command::new(CODESIGN).arg("-h")) {
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            // `codesign -h` prints usage and exits non-zero; being able to
            // start it is enough.
            _ => true,
        };
        if !available {
            log::warn!(
                "`{CODESIGN}` not found, shadow copies will not be re-signed. \
                 Install the Xcode command line tools if loading fails"
            );
        }
        Self { available }
    }

    /// Ad-hoc signs `binary` in place. Failures are logged, the load that
    /// follows reports whether they mattered.
    pub(crate) fn sign(&self, binary: &Path) {
        if !self.available {
            return;
        }

        // `--sign -` is the ad-hoc identity, `--force` replaces the copied signature
        match run(Command::new(CODESIGN).args(["--sign", "-", "--force"]).arg(binary)) {
            Ok(output) if output.status.success() => log::debug!("re-signed {binary:?}"),
            Ok(output) => log::warn!(
                "`{CODESIGN}` failed for {binary:?} ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(err) => log::warn!("unable to run `{CODESIGN}` for {binary:?}: {err}"),
        }
    }
}

fn run(cmd: &mut Command) -> std::io::Result<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).output()
}
