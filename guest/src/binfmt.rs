//! Foreign-architecture binary registration through binfmt_misc.

use crate::error::GuestError;
use crate::layout::GuestLayout;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// ELF header magic and mask for 32-bit x86 executables.
const X86_MAGIC: &str = r"\x7fELF\x01\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x03\x00";
const X86_MASK: &str = r"\xff\xff\xff\xff\xff\xfe\xfe\x00\x00\x00\x00\xff\xff\xff\xff\xff\xfe\xff\xff\xff";

/// ELF header magic and mask for x86_64 executables.
const X86_64_MAGIC: &str = r"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x3e\x00";
const X86_64_MASK: &str = X86_MASK;

/// Interpreter flags: preserve argv[0], open the binary for the interpreter,
/// use the binary's credentials, keep the interpreter open (fix binary).
const FLAGS: &str = "POCF";

/// One `:name:type:offset:magic:mask:interpreter:flags` registration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinfmtRule {
    pub name: &'static str,
    pub offset: u32,
    pub magic: &'static str,
    pub mask: &'static str,
}

impl BinfmtRule {
    pub fn render(&self, interpreter: &Path) -> String {
        format!(
            ":{}:M:{}:{}:{}:{}:{}",
            self.name,
            self.offset,
            self.magic,
            self.mask,
            interpreter.display(),
            FLAGS
        )
    }
}

pub fn fex_rules() -> [BinfmtRule; 2] {
    [
        BinfmtRule {
            name: "FEX-x86",
            offset: 0,
            magic: X86_MAGIC,
            mask: X86_MASK,
        },
        BinfmtRule {
            name: "FEX-x86_64",
            offset: 0,
            magic: X86_64_MAGIC,
            mask: X86_64_MASK,
        },
    ]
}

/// Register the FEX interpreter for x86 and x86_64 ELF binaries.
///
/// Returns `Ok(false)` without touching the register file when the
/// interpreter is not installed.
pub fn register_interpreter(layout: &GuestLayout) -> Result<bool, GuestError> {
    let interpreter = &layout.binfmt_interpreter;
    if !interpreter.exists() {
        tracing::debug!(
            interpreter = %interpreter.display(),
            "interpreter absent, skipping binfmt registration"
        );
        return Ok(false);
    }

    let register = layout.binfmt_register();
    let mut file = OpenOptions::new()
        .write(true)
        .open(&register)
        .map_err(|e| GuestError::io(format!("opening {}", register.display()), e))?;

    // The kernel takes exactly one rule per write.
    for rule in fex_rules() {
        let line = rule.render(interpreter);
        file.write_all(line.as_bytes())
            .map_err(|e| GuestError::io(format!("registering {} magic", rule.name), e))?;
        tracing::info!(name = rule.name, "registered binfmt handler");
    }

    Ok(true)
}
