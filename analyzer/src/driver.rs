// driver.rs — Bounded-parallel IR emission and content-addressed cache
//
// Drives the external lowering compiler: one subprocess per translation
// unit, bounded by the hardware parallelism, each writing textual IR to a
// cache artifact named by a sha-256 key over (source bytes, sorted compile
// args, tool version). Emission is the only parallel phase; modules are
// parsed sequentially and profiles inserted into one map. Artifacts are
// written to a side path and renamed into place, so a concurrent reader
// observes either absence or a complete file.
//
// Preconditions: units carry a readable `source_path`; compile args follow
//   the compile-database convention (element 0 names the compiler).
// Postconditions: successful artifacts are retained as the cache; error
//   captures are always removed; failed artifacts are removed.
// Failure modes: per-unit emission/parse failures degrade that unit to
//   AST-only confidence (reported in `failed_units`); never fatal.
// Side effects: subprocesses, cache files, log records.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::irmodel::parse_ir_file;
use crate::irprofile::{build_profiles, ProfileMap};
use crate::tu::TranslationUnit;

/// Wall-clock limit for one emission subprocess.
pub const EMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Fallback compiler names probed on the search path when the
/// compile-database entry does not resolve.
const FALLBACK_COMPILERS: [&str; 4] = ["clang++", "clang++-18", "clang++-17", "clang++-16"];

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// `O0` (default) preserves structural truth; higher levels show
    /// optimizer effects.
    pub opt_level: String,
    pub cache_dir: PathBuf,
    pub timeout: Duration,
    pub max_workers: Option<usize>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            opt_level: "O0".into(),
            cache_dir: std::env::temp_dir(),
            timeout: EMIT_TIMEOUT,
            max_workers: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IrJob {
    pub source_path: String,
    pub compiler: PathBuf,
    /// Arguments after the program name, including `-o <partial>` and the
    /// source path. No shell is involved anywhere.
    pub args: Vec<String>,
    pub ir_path: PathBuf,
    pub partial_path: PathBuf,
    pub err_path: PathBuf,
    pub cached: bool,
}

#[derive(Debug, Clone)]
enum JobOutcome {
    Completed(i32),
    TimedOut,
    SpawnFailed(String),
}

#[derive(Debug, Default)]
pub struct DriverOutcome {
    pub profiles: ProfileMap,
    /// Source paths whose IR could not be emitted or parsed; their
    /// diagnostics keep AST-only confidence.
    pub failed_units: Vec<String>,
}

// ── Compiler resolution ─────────────────────────────────────────────────────

/// Resolve a program name on the process search path, or validate a path
/// containing a separator directly.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if name.contains('/') {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn resolve_compiler(compile_args: &[String]) -> Option<PathBuf> {
    if let Some(entry) = compile_args.first() {
        if let Some(resolved) = find_program(entry) {
            return Some(resolved);
        }
    }
    FALLBACK_COMPILERS.iter().find_map(|name| find_program(name))
}

// ── Cache key ───────────────────────────────────────────────────────────────

/// Compile arguments that feed the key: everything except the program slot,
/// the input path, and `-c` / `-o <path>`.
fn key_args(compile_args: &[String], source_path: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut iter = compile_args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" => {}
            "-o" => {
                iter.next();
            }
            _ if arg == source_path => {}
            _ => args.push(arg.clone()),
        }
    }
    args.sort_unstable();
    args
}

/// Deterministic content-addressed key: source bytes + sorted args + tool
/// version. Changing the tool version invalidates the cache without an
/// explicit purge.
pub fn cache_key(source_bytes: &[u8], sorted_args: &[String], opt_level: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_bytes);
    for arg in sorted_args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(opt_level.as_bytes());
    hasher.update([0u8]);
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

// ── Job planning ────────────────────────────────────────────────────────────

pub fn plan_jobs(
    units: &[TranslationUnit],
    extra_args: &[String],
    options: &DriverOptions,
) -> Vec<IrJob> {
    let mut jobs = Vec::new();

    for tu in units {
        if tu.source_path.is_empty() {
            continue;
        }
        let Some(compiler) = resolve_compiler(&tu.compile_args) else {
            warn!(
                "cannot resolve a lowering compiler for '{}', skipping IR",
                tu.source_path
            );
            continue;
        };

        let mut pass_through = key_args(&tu.compile_args, &tu.source_path);
        pass_through.extend(extra_args.iter().cloned());
        pass_through.sort_unstable();

        let source_bytes = match fs::read(&tu.source_path) {
            Ok(bytes) => bytes,
            Err(_) => tu.source_path.clone().into_bytes(),
        };
        let key = cache_key(&source_bytes, &pass_through, &options.opt_level);

        let ir_path = options.cache_dir.join(format!("faultline-{key}.ll"));
        let partial_path = options
            .cache_dir
            .join(format!("faultline-{key}.ll.{}.partial", std::process::id()));
        let err_path = options.cache_dir.join(format!("faultline-{key}.err"));
        let cached = ir_path.exists();

        let mut args = vec![
            "-S".to_string(),
            "-emit-llvm".to_string(),
            "-g".to_string(),
            format!("-{}", options.opt_level),
        ];
        args.extend(pass_through);
        args.push("-o".to_string());
        args.push(partial_path.display().to_string());
        args.push(tu.source_path.clone());

        jobs.push(IrJob {
            source_path: tu.source_path.clone(),
            compiler,
            args,
            ir_path,
            partial_path,
            err_path,
            cached,
        });
    }

    jobs
}

// ── Bounded-parallel emission ───────────────────────────────────────────────

fn run_one(job: &IrJob, timeout: Duration) -> JobOutcome {
    let stderr_file = match fs::File::create(&job.err_path) {
        Ok(f) => f,
        Err(e) => return JobOutcome::SpawnFailed(format!("cannot open stderr capture: {e}")),
    };

    let mut child = match Command::new(&job.compiler)
        .args(&job.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr_file)
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return JobOutcome::SpawnFailed(e.to_string()),
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                if code == 0 {
                    // Publish atomically: a reader sees absence or the whole
                    // artifact.
                    if let Err(e) = fs::rename(&job.partial_path, &job.ir_path) {
                        return JobOutcome::SpawnFailed(format!(
                            "cannot publish IR artifact: {e}"
                        ));
                    }
                }
                return JobOutcome::Completed(code);
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return JobOutcome::TimedOut;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => return JobOutcome::SpawnFailed(e.to_string()),
        }
    }
}

fn emit_jobs(jobs: &[IrJob], options: &DriverOptions) -> Vec<Option<JobOutcome>> {
    let pending: VecDeque<usize> = jobs
        .iter()
        .enumerate()
        .filter(|(_, j)| !j.cached)
        .map(|(i, _)| i)
        .collect();
    let job_count = pending.len();
    let results: Vec<Mutex<Option<JobOutcome>>> =
        jobs.iter().map(|_| Mutex::new(None)).collect();
    if job_count == 0 {
        return results.into_iter().map(|m| m.into_inner().unwrap()).collect();
    }

    let hardware = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = options
        .max_workers
        .unwrap_or(hardware)
        .min(job_count)
        .max(1);

    let queue = Mutex::new(pending);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = {
                    let mut q = queue.lock().unwrap();
                    q.pop_front()
                };
                let Some(index) = index else { break };
                let outcome = run_one(&jobs[index], options.timeout);
                *results[index].lock().unwrap() = Some(outcome);
            });
        }
    });

    results.into_iter().map(|m| m.into_inner().unwrap()).collect()
}

// ── Sequential parse and profile ────────────────────────────────────────────

/// Emit IR for every unit, then parse sequentially (the reader context is
/// single-threaded by contract) and build profiles.
pub fn emit_and_profile(
    units: &[TranslationUnit],
    extra_args: &[String],
    options: &DriverOptions,
) -> DriverOutcome {
    let jobs = plan_jobs(units, extra_args, options);
    if jobs.is_empty() && !units.is_empty() {
        warn!("no compilable IR jobs; skipping the IR analysis pass");
        return DriverOutcome {
            profiles: ProfileMap::new(),
            failed_units: units.iter().map(|u| u.source_path.clone()).collect(),
        };
    }

    let started = Instant::now();
    let outcomes = emit_jobs(&jobs, options);
    debug!(
        "IR emission: {} job(s) ({} cached) in {:.1}ms",
        jobs.len(),
        jobs.iter().filter(|j| j.cached).count(),
        started.elapsed().as_secs_f64() * 1000.0
    );

    let mut result = DriverOutcome::default();

    for (job, outcome) in jobs.iter().zip(outcomes) {
        let emitted = if job.cached {
            true
        } else {
            match outcome {
                Some(JobOutcome::Completed(0)) => true,
                Some(JobOutcome::Completed(code)) => {
                    let stderr = fs::read_to_string(&job.err_path).unwrap_or_default();
                    warn!(
                        "IR emission failed for '{}' (exit {}): {}",
                        job.source_path,
                        code,
                        stderr.trim()
                    );
                    false
                }
                Some(JobOutcome::TimedOut) => {
                    warn!(
                        "IR emission for '{}' exceeded {}s and was killed; \
                         AST-only diagnostics for this file",
                        job.source_path,
                        options.timeout.as_secs()
                    );
                    false
                }
                Some(JobOutcome::SpawnFailed(msg)) => {
                    warn!("IR emission failed for '{}': {}", job.source_path, msg);
                    false
                }
                None => false,
            }
        };

        if emitted {
            match parse_ir_file(&job.ir_path) {
                Ok(module) => build_profiles(&module, &mut result.profiles),
                Err(e) => {
                    warn!("IR parse failed for '{}': {}", job.source_path, e);
                    result.failed_units.push(job.source_path.clone());
                    if !job.cached {
                        let _ = fs::remove_file(&job.ir_path);
                    }
                }
            }
        } else {
            result.failed_units.push(job.source_path.clone());
            let _ = fs::remove_file(&job.partial_path);
        }

        // Error captures never persist.
        let _ = fs::remove_file(&job.err_path);
    }

    result
}
