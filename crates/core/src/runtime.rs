use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[cfg(unix)]
const ORT_LIB_NAME: &str = "libonnxruntime.so";
#[cfg(windows)]
const ORT_LIB_NAME: &str = "onnxruntime.dll";

const ENV_ORT_DYLIB_PATH: &str = "ORT_DYLIB_PATH";

/// Directories probed for the ONNX Runtime shared library, in order:
///   1. `<exe_dir>/` (Windows only)
///   2. `<exe_dir>/lib/`
///   3. `<exe_dir>/../lib/`
///   4. `<cwd>/lib/`
///   5. `/usr/local/lib/`, `/usr/lib/` (Unix only)
fn candidate_lib_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = env::current_exe().and_then(|p| p.canonicalize()) {
        if let Some(exe_dir) = exe.parent() {
            #[cfg(windows)]
            {
                dirs.push(exe_dir.to_path_buf());
            }
            dirs.push(exe_dir.join("lib"));
            if let Some(parent) = exe_dir.parent() {
                dirs.push(parent.join("lib"));
            }
        }
    }
    if let Ok(cwd) = env::current_dir() {
        let cwd_lib = cwd.join("lib");
        if !dirs.contains(&cwd_lib) {
            dirs.push(cwd_lib);
        }
    }
    #[cfg(unix)]
    {
        dirs.push(PathBuf::from("/usr/local/lib"));
        dirs.push(PathBuf::from("/usr/lib"));
    }
    dirs
}

/// Directories probed for bundled tools (the video encoder) before `PATH`.
fn candidate_bin_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = env::current_exe().and_then(|p| p.canonicalize()) {
        if let Some(exe_dir) = exe.parent() {
            dirs.push(exe_dir.to_path_buf());
            dirs.push(exe_dir.join("bin"));
        }
    }
    if let Ok(cwd) = env::current_dir() {
        let cwd_bin = cwd.join("bin");
        if !dirs.contains(&cwd_bin) {
            dirs.push(cwd_bin);
        }
    }
    dirs
}

#[cfg(unix)]
fn candidate_binary_names(binary: &str) -> Vec<String> {
    vec![binary.to_string()]
}

#[cfg(windows)]
fn candidate_binary_names(binary: &str) -> Vec<String> {
    if binary.to_ascii_lowercase().ends_with(".exe") {
        return vec![binary.to_string()];
    }
    vec![format!("{binary}.exe"), binary.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn find_binary_in_dirs(binary: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let names = candidate_binary_names(binary);
    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

/// Locate an external tool.
///
/// A value with a directory component is taken as a path and must be an
/// executable file. Non-executable candidates in the bundled directories are
/// skipped.
/// A bare name is looked up next to the executable, then in `./bin`, then on
/// `PATH`.
pub fn resolve_binary(binary: &str) -> Option<PathBuf> {
    let as_path = Path::new(binary);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }
    find_binary_in_dirs(binary, &candidate_bin_dirs()).or_else(|| which::which(binary).ok())
}

fn find_ort_dylib_in_dirs(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(ORT_LIB_NAME))
        .find(|candidate| candidate.is_file())
}

/// The ONNX Runtime library that will be loaded, if one can be found.
pub fn ort_library_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(ENV_ORT_DYLIB_PATH) {
        let path = PathBuf::from(path);
        return path.is_file().then_some(path);
    }
    find_ort_dylib_in_dirs(&candidate_lib_dirs())
}

/// Point ONNX Runtime at a bundled library when the user has not set one.
///
/// Call at the very start of `main()`, before any ORT or tracing init.
pub fn setup_runtime_libs() {
    if env::var_os(ENV_ORT_DYLIB_PATH).is_some() {
        return;
    }
    if let Some(path) = find_ort_dylib_in_dirs(&candidate_lib_dirs()) {
        env::set_var(ENV_ORT_DYLIB_PATH, &path);
    }
}

/// Log which runtime pieces were resolved. Call after tracing is initialized.
pub fn log_runtime_lib_status(encoder_binary: &str) {
    match env::var(ENV_ORT_DYLIB_PATH) {
        Ok(ort) if Path::new(&ort).is_file() => info!("ORT library: {ort}"),
        Ok(ort) => warn!("{ENV_ORT_DYLIB_PATH} set to {ort} but file not found"),
        Err(_) => warn!("ORT library not found; learned interpolation will be unavailable"),
    }

    match resolve_binary(encoder_binary) {
        Some(path) => info!("Video encoder: {}", path.display()),
        None => warn!("Video encoder '{encoder_binary}' not found; renders will be placeholders or fail"),
    }
}
