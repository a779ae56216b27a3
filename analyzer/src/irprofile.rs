// irprofile.rs — Per-function IR profiles
//
// Walks a parsed lowered-IR module and accumulates one profile per function
// with a body: stack allocations and their byte sizes, atomic operations
// with ordering and loop membership, heap-relevant and lock-relevant call
// sites, direct/indirect call counts, and fence / sequentially-consistent
// totals. Loop membership uses the conservative back-edge approximation
// (a block is looping when some successor is itself or one of its
// predecessors); precision here sharpens escalation text only.
//
// Preconditions: `module` came from the IR reader.
// Postconditions: profiles are keyed by mangled name; built once per module.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::irmodel::{IrAtomicOp, IrFunction, IrInstr, IrModule, IrOrdering};

// ── Profile data ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IrAllocaInfo {
    pub name: String,
    pub size_bytes: u64,
    pub is_array: bool,
}

#[derive(Debug, Clone)]
pub struct IrCallSiteInfo {
    /// Demangleable callee symbol for a direct call; `None` when indirect.
    pub callee_name: Option<String>,
    pub is_indirect: bool,
    pub in_loop: bool,
    pub source_line: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IrAtomicSite {
    pub op: IrAtomicOp,
    pub ordering: IrOrdering,
    pub in_loop: bool,
    pub source_file: String,
    pub source_line: Option<u32>,
}

impl IrAtomicSite {
    pub fn is_write(&self) -> bool {
        matches!(
            self.op,
            IrAtomicOp::Store | IrAtomicOp::Rmw | IrAtomicOp::CmpXchg
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct IrFunctionProfile {
    pub mangled_name: String,
    pub demangled_name: String,

    // Stack frame
    pub total_alloca_bytes: u64,
    pub allocas: Vec<IrAllocaInfo>,

    // Heap- and lock-relevant call sites (post-inlining)
    pub heap_calls: Vec<IrCallSiteInfo>,
    pub mutex_calls: Vec<IrCallSiteInfo>,

    // Call kinds (post-devirtualization)
    pub indirect_call_count: u32,
    pub direct_call_count: u32,

    // Atomics and fences
    pub atomics: Vec<IrAtomicSite>,
    pub fence_count: u32,
    pub seq_cst_count: u32,

    // Structure
    pub basic_block_count: u32,
    pub loop_block_count: u32,
}

pub type ProfileMap = BTreeMap<String, IrFunctionProfile>;

// ── Callee classification ───────────────────────────────────────────────────

/// The C allocator family plus the common operator-new manglings (exact and
/// prefixed for the aligned/nothrow variants).
pub fn is_heap_alloc_name(name: &str) -> bool {
    matches!(
        name,
        "malloc" | "calloc" | "realloc" | "aligned_alloc" | "posix_memalign"
    ) || name.starts_with("_Znwm")
        || name.starts_with("_Znam")
}

pub fn is_heap_free_name(name: &str) -> bool {
    name == "free" || name.starts_with("_ZdlPv") || name.starts_with("_ZdaPv")
}

fn is_lock_name(name: &str) -> bool {
    if name.starts_with("pthread_mutex") || name.starts_with("pthread_spin") {
        return true;
    }
    let demangled = demangle(name);
    demangled.contains("mutex") || demangled.ends_with("::lock") || demangled.ends_with("::try_lock")
}

// ── Demangling ──────────────────────────────────────────────────────────────

/// Best-effort Itanium demangler for the `_Z` / `_ZN` nested-name forms the
/// refiner correlates on. Unsupported encodings come back unchanged; argument
/// encodings are dropped (the qualified name is what matters for suffix
/// matching).
pub fn demangle(name: &str) -> String {
    let Some(rest) = name.strip_prefix("_Z") else {
        return name.to_string();
    };

    if let Some(mut nested) = rest.strip_prefix('N') {
        let mut segments: Vec<String> = Vec::new();
        loop {
            if nested.starts_with('E') {
                break; // argument encodings ignored
            }
            if let Some(r) = nested.strip_prefix("St") {
                segments.push("std".to_string());
                nested = r;
                continue;
            }
            if let Some(r) = nested.strip_prefix('L') {
                nested = r; // internal-linkage marker
                continue;
            }
            match read_length_prefixed(nested) {
                Some((seg, r)) => {
                    segments.push(seg.to_string());
                    nested = r;
                }
                None => return name.to_string(),
            }
        }
        if segments.is_empty() {
            return name.to_string();
        }
        return segments.join("::");
    }

    let rest = rest.strip_prefix('L').unwrap_or(rest);
    match read_length_prefixed(rest) {
        Some((seg, _)) => seg.to_string(),
        None => name.to_string(),
    }
}

fn read_length_prefixed(s: &str) -> Option<(&str, &str)> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let len: usize = digits.parse().ok()?;
    let rest = &s[digits.len()..];
    if rest.len() < len {
        return None;
    }
    Some((&rest[..len], &rest[len..]))
}

// ── Profile building ────────────────────────────────────────────────────────

/// Build profiles for every function in `module`, inserting into `profiles`.
pub fn build_profiles(module: &IrModule, profiles: &mut ProfileMap) {
    for function in &module.functions {
        let profile = profile_function(function, module);
        profiles.insert(profile.mangled_name.clone(), profile);
    }
}

fn loop_blocks(function: &IrFunction) -> HashSet<usize> {
    let label_to_idx: HashMap<&str, usize> = function
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.label.as_str(), i))
        .collect();

    let mut predecessors: HashMap<usize, HashSet<usize>> = HashMap::new();
    for (i, block) in function.blocks.iter().enumerate() {
        for succ in &block.successors {
            if let Some(&j) = label_to_idx.get(succ.as_str()) {
                predecessors.entry(j).or_default().insert(i);
            }
        }
    }

    let mut looping = HashSet::new();
    for (i, block) in function.blocks.iter().enumerate() {
        let preds = predecessors.get(&i);
        for succ in &block.successors {
            let Some(&j) = label_to_idx.get(succ.as_str()) else {
                continue;
            };
            // Self-loop, or the successor already feeds this block.
            if j == i || preds.is_some_and(|p| p.contains(&j)) {
                looping.insert(i);
                break;
            }
        }
    }
    looping
}

fn profile_function(function: &IrFunction, module: &IrModule) -> IrFunctionProfile {
    let mut profile = IrFunctionProfile {
        mangled_name: function.name.clone(),
        demangled_name: demangle(&function.name),
        basic_block_count: function.blocks.len() as u32,
        ..IrFunctionProfile::default()
    };

    let looping = loop_blocks(function);
    profile.loop_block_count = looping.len() as u32;

    let line_of = |dbg_ref: Option<u32>| dbg_ref.and_then(|id| module.dbg_lines.get(&id).copied());

    for (bi, block) in function.blocks.iter().enumerate() {
        let in_loop = looping.contains(&bi);

        for instr in &block.instructions {
            match instr {
                IrInstr::Alloca {
                    name,
                    size_bytes,
                    is_array,
                } => {
                    profile.total_alloca_bytes += size_bytes;
                    profile.allocas.push(IrAllocaInfo {
                        name: name.clone(),
                        size_bytes: *size_bytes,
                        is_array: *is_array,
                    });
                }
                IrInstr::Atomic {
                    op,
                    ordering,
                    dbg_ref,
                } => {
                    if *op == IrAtomicOp::Fence {
                        profile.fence_count += 1;
                    }
                    if *ordering == IrOrdering::SeqCst {
                        profile.seq_cst_count += 1;
                    }
                    profile.atomics.push(IrAtomicSite {
                        op: *op,
                        ordering: *ordering,
                        in_loop,
                        source_file: module.source_filename.clone(),
                        source_line: line_of(*dbg_ref),
                    });
                }
                IrInstr::Call { callee, dbg_ref } => match callee {
                    None => {
                        profile.indirect_call_count += 1;
                        profile.heap_calls.push(IrCallSiteInfo {
                            callee_name: None,
                            is_indirect: true,
                            in_loop,
                            source_line: line_of(*dbg_ref),
                        });
                    }
                    Some(name) => {
                        profile.direct_call_count += 1;
                        if is_heap_alloc_name(name) || is_heap_free_name(name) {
                            profile.heap_calls.push(IrCallSiteInfo {
                                callee_name: Some(name.clone()),
                                is_indirect: false,
                                in_loop,
                                source_line: line_of(*dbg_ref),
                            });
                        }
                        if is_lock_name(name) {
                            profile.mutex_calls.push(IrCallSiteInfo {
                                callee_name: Some(name.clone()),
                                is_indirect: false,
                                in_loop,
                                source_line: line_of(*dbg_ref),
                            });
                        }
                    }
                },
            }
        }
    }

    profile
}
