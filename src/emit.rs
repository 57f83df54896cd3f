//! Assembly emission
//!
//! Walks a finished instruction buffer in order, applying the scheduling
//! hints, and delegates every record to the platform's writer. Emission
//! never re-optimises: the generator's decisions are final.

use crate::codegen::Func;
use crate::insn::{Insn, Opcode};
use crate::platform::Platform;

use itertools::Itertools;

use std::io;

/// Emission order: each record may carry a signed displacement moving it
/// that many positions from its buffer index.
fn schedule(insns: &[Insn]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..insns.len()).collect();
    order.sort_by_key(|&i| i as i64 + insns[i].sched() as i64);
    order
}

/// Render `func` as assembly text for `platform`.
pub fn write_assembly<W: io::Write>(out: &mut W, platform: &Platform, func: &Func) -> io::Result<()> {
    let mut writer = platform.writer();

    writeln!(out, "\t.text")?;
    writeln!(out, "\t.balign {}", platform.code_align())?;
    writeln!(out, "\t.globl {}", func.name())?;
    writeln!(
        out,
        "{} {}: generated by gencrypto for {}",
        platform.comment(),
        func.name(),
        platform.name()
    )?;
    writeln!(out, "{}:", func.name())?;

    for i in schedule(func.insns()) {
        let insn = &func.insns()[i];
        if insn.op() == Opcode::Table {
            let idx = insn.imm().unwrap_or(0) as usize;
            let table = &func.sboxes()[idx];
            writeln!(out, "\t.balign 256")?;
            writeln!(out, ".Ltab{}:", idx)?;
            for row in table.chunks(12) {
                writeln!(out, "\t.byte {}", row.iter().map(|b| b.to_string()).join(", "))?;
            }
            continue;
        }
        writer.write_insn(out, platform, func.frame(), insn)?;
    }

    writeln!(out, "\t.size {0}, .-{0}", func.name())
}

/// Render `func` to a string; emission is deterministic, so two calls
/// produce identical text.
pub fn assembly_string(platform: &Platform, func: &Func) -> io::Result<String> {
    let mut buf = Vec::new();
    write_assembly(&mut buf, platform, func)?;
    Ok(String::from_utf8(buf).expect("writers emit UTF-8"))
}
