//! Scripted stand-ins for the AXIOM executable.
//!
//! Shared by the `engine` and `harness` integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

pub const FAKE_ENGINE: &str = r#"#!/bin/sh
case "$1" in
  --help)
    echo "AXIOM Engine v3.0 - Usage:"
    echo "  axiom \"expression\""
    exit 0 ;;
  --daemon)
    echo "Starting AXIOM Engine Daemon Mode..."
    while IFS= read -r line; do
      case "$line" in
        exit|stop) exit 0 ;;
        "2+2") echo "4" ;;
        "2 * 3") echo "6" ;;
        *) echo "Error: cannot evaluate" ;;
      esac
      echo "__END_OF_RESPONSE__"
    done
    exit 0 ;;
  "")
    while IFS= read -r line; do
      case "$line" in
        exit) exit 0 ;;
        "2+2") echo "4" ;;
        *) echo "?" ;;
      esac
    done
    exit 0 ;;
  "1+1") echo "2" ;;
  "2+2") echo "NumPy loaded successfully"; echo "4" ;;
  "2 * 3") echo "6" ;;
  "0.1 + 0.2") echo "0.3" ;;
  "sqrt(16)") echo "4" ;;
  "max(1,2,3,4,5)") echo "5" ;;
  "3.14159265358979") echo "3.14159265358979" ;;
  "symbolic") echo "Switched to SYMBOLIC mode" ;;
  "linear") echo "Switched to LINEAR SYSTEM mode" ;;
  "crash") kill -s SEGV $$ ;;
  "hang") exec sleep 30 ;;
  *) echo "Error: cannot evaluate" >&2; exit 1 ;;
esac
"#;

/// Exits before the handshake can start.
pub const DEAD_DAEMON: &str = "#!/bin/sh\necho 'fatal: no pipe' >&2\nexit 3\n";

/// Answers but never sends the sentinel.
pub const MUTE_DAEMON: &str = r#"#!/bin/sh
while IFS= read -r line; do
  echo "4"
done
"#;

/// Answers `slow` only after a second; everything else at once.
pub const SLOW_DAEMON: &str = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    exit) exit 0 ;;
    slow) sleep 1; echo "slow-answer" ;;
    *) echo "$line-answer" ;;
  esac
  echo "__END_OF_RESPONSE__"
done
"#;

/// Writes far more than a pipe buffer to stderr before every answer.
pub const CHATTY_DAEMON: &str = r#"#!/bin/sh
while IFS= read -r line; do
  [ "$line" = exit ] && exit 0
  head -c 262144 /dev/zero | tr '\0' 'x' >&2
  echo "4"
  echo "__END_OF_RESPONSE__"
done
"#;

/// Never reads stdin.
pub const DEAF_ENGINE: &str = "#!/bin/sh\nexec sleep 5\n";

/// Dies by SIGSEGV on any input.
pub const CRASHING_ENGINE: &str = "#!/bin/sh\nkill -s SEGV $$\n";

pub struct Fixtures {
    _dir: TempDir,
    pub engine: PathBuf,
    pub dead_daemon: PathBuf,
    pub mute_daemon: PathBuf,
    pub slow_daemon: PathBuf,
    pub chatty_daemon: PathBuf,
    pub deaf_engine: PathBuf,
    pub crashing_engine: PathBuf,
}

/// Scripts are written once per test binary, before any test spawns a process.
pub fn fixtures() -> &'static Fixtures {
    static FIXTURES: OnceLock<Fixtures> = OnceLock::new();
    FIXTURES.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = write_script(dir.path(), "axiom", FAKE_ENGINE);
        let dead_daemon = write_script(dir.path(), "axiom-dead", DEAD_DAEMON);
        let mute_daemon = write_script(dir.path(), "axiom-mute", MUTE_DAEMON);
        let slow_daemon = write_script(dir.path(), "axiom-slow", SLOW_DAEMON);
        let chatty_daemon = write_script(dir.path(), "axiom-chatty", CHATTY_DAEMON);
        let deaf_engine = write_script(dir.path(), "axiom-deaf", DEAF_ENGINE);
        let crashing_engine = write_script(dir.path(), "axiom-crash", CRASHING_ENGINE);
        Fixtures {
            _dir: dir,
            engine,
            dead_daemon,
            mute_daemon,
            slow_daemon,
            chatty_daemon,
            deaf_engine,
            crashing_engine,
        }
    })
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}
