//! Primitive registration surface
//!
//! Every built-in generator contributes one entry per (name, variant,
//! platform). The table is built once behind a one-shot initialiser and
//! handed out as an immutable snapshot; listing order is lexicographic
//! on (name, variant, platform).

use crate::codegen::{CodeGen, Func};
use crate::error::{Error, Result};
use crate::gen;
use crate::platform::Platform;

use std::sync::OnceLock;

use tracing::{debug, warn};

/// One registered generator.
pub struct Registration {
    /// Primitive name.
    pub name: &'static str,
    /// Variant tag, empty when the primitive has only one.
    pub variant: &'static str,
    /// Platform tag the entry targets.
    pub platform: &'static str,
    /// Emitted function name.
    pub func_name: &'static str,
    /// Generator body.
    pub build: fn(&mut CodeGen) -> Result<()>,
    /// Known-answer tests for the entry.
    pub kat: fn() -> Result<()>,
}

impl Registration {
    /// Fully qualified `name[:variant][:platform]`.
    pub fn qualified(&self) -> String {
        let mut q = self.name.to_string();
        if !self.variant.is_empty() {
            q.push(':');
            q.push_str(self.variant);
        }
        q.push(':');
        q.push_str(self.platform);
        q
    }

    /// Instantiate the platform and generate the function.
    pub fn generate(&self) -> Result<(Platform, Func)> {
        let platform =
            Platform::by_name(self.platform).ok_or(Error::InvalidArgument("unknown platform tag"))?;
        let mut cg = CodeGen::new(&platform);
        let func = (self.build)(&mut cg)
            .and_then(|_| cg.finish())
            .map_err(|e| {
                warn!(function = self.func_name, error = %e, "generation failed");
                e
            })?;
        debug!(entry = %self.qualified(), insns = func.insns().len(), "generated");
        Ok((platform, func))
    }
}

/// The immutable registration snapshot.
pub struct Registry {
    entries: Vec<Registration>,
}

impl Registry {
    /// Entries in lexicographic (name, variant, platform) order.
    pub fn entries(&self) -> &[Registration] {
        &self.entries
    }

    /// Look an entry up by its fully qualified name.
    pub fn lookup(&self, qualified: &str) -> Option<&Registration> {
        self.entries.iter().find(|e| e.qualified() == qualified)
    }

    /// Look an entry up by its emitted function name.
    pub fn find_func(&self, func_name: &str) -> Option<&Registration> {
        self.entries.iter().find(|e| e.func_name == func_name)
    }
}

/// The process-wide registry; initialised on first use, read-only after.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut entries = gen::registrations();
        entries.sort_by(|a, b| {
            (a.name, a.variant, a.platform).cmp(&(b.name, b.variant, b.platform))
        });
        Registry { entries }
    })
}
