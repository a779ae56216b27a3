// escape.rs — Thread-escape model
//
// Decides whether a record or global may be written from more than one
// thread of control. Conservative: when in doubt, escape. All predicates are
// total and monotone — adding a member never turns an escaping record into a
// non-escaping one.
//
// Classification inspects canonical type kinds only; printed type names are
// never consulted, so aliases and template instantiations resolve the same
// way the spelled-out types do.
//
// Preconditions: none.
// Postconditions: none.
// Failure modes: none (total predicates).
// Side effects: none.

use std::collections::HashMap;

use crate::tu::{
    GlobalDecl, RecordDecl, StorageClass, TranslationUnit, TypeKind, TypeRef,
};

#[derive(Debug, Default)]
pub struct EscapeModel;

impl EscapeModel {
    pub fn new() -> Self {
        Self
    }

    /// An atomic word: the language-level atomic template or an
    /// atomic-qualified primitive.
    pub fn is_atomic_type(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind, TypeKind::Atomic(_))
    }

    /// Any mutex / condition-variable / semaphore / latch / barrier variant,
    /// including the POSIX structs.
    pub fn is_sync_type(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind, TypeKind::SyncPrimitive(_))
    }

    /// Strong or weak shared-ownership smart pointer.
    pub fn is_shared_ownership_type(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind, TypeKind::SharedOwnership { .. })
    }

    /// Type-erased callable value or bare function pointer.
    pub fn is_callback_type(&self, ty: &TypeRef) -> bool {
        matches!(
            ty.kind,
            TypeKind::ErasedCallable | TypeKind::FunctionPointer
        )
    }

    pub fn has_atomic_members(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        self.any_member(record, &tu.record_index(), &|ty| self.is_atomic_type(ty))
    }

    pub fn has_sync_primitives(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        self.any_member(record, &tu.record_index(), &|ty| self.is_sync_type(ty))
    }

    pub fn has_shared_ownership_members(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        self.any_member(record, &tu.record_index(), &|ty| {
            self.is_shared_ownership_type(ty)
        })
    }

    pub fn has_callback_members(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        self.any_member(record, &tu.record_index(), &|ty| self.is_callback_type(ty))
    }

    pub fn has_volatile_members(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        self.any_member(record, &tu.record_index(), &|ty| ty.volatile_qual)
    }

    /// May this record be concurrently visible to more than one thread?
    /// True if it holds, directly or through non-virtual bases, any atomic
    /// word, synchronization primitive, shared-ownership pointer, erased
    /// callable / function pointer, or volatile-declared field.
    pub fn may_escape_thread(&self, record: &RecordDecl, tu: &TranslationUnit) -> bool {
        let index = tu.record_index();
        self.any_member(record, &index, &|ty| {
            self.is_atomic_type(ty)
                || self.is_sync_type(ty)
                || self.is_shared_ownership_type(ty)
                || self.is_callback_type(ty)
                || ty.volatile_qual
        })
    }

    /// A global is shared-mutable iff it has program lifetime, is not
    /// read-only qualified, and is not thread-local.
    pub fn is_global_shared_mutable(&self, global: &GlobalDecl) -> bool {
        match global.storage {
            StorageClass::ThreadLocal => false,
            StorageClass::Global | StorageClass::Static => !global.ty.const_qual,
        }
    }

    fn any_member(
        &self,
        record: &RecordDecl,
        index: &HashMap<&str, &RecordDecl>,
        pred: &dyn Fn(&TypeRef) -> bool,
    ) -> bool {
        if !record.is_complete {
            return false;
        }
        if record.fields.iter().any(|f| pred(&f.ty)) {
            return true;
        }
        record.bases.iter().filter(|b| !b.is_virtual).any(|b| {
            index
                .get(b.record.as_str())
                .is_some_and(|base| self.any_member(base, index, pred))
        })
    }
}
