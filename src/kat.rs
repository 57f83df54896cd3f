//! Known-answer-test harness
//!
//! Generates a function, runs the matching interpreter driver per
//! vector, and byte-compares the result. Prints `ok` / `FAILED` per
//! vector with a hex diff on mismatch; mismatches also surface as
//! errors so test runners fail loudly.

use crate::codegen::Func;
use crate::error::{Error, Result};
use crate::interp::Interpreter;
use crate::platform::Platform;

use tracing::info;

/// Lowercase hex rendering.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare `got` against `want`, reporting per the driver contract.
pub fn report(label: &str, got: &[u8], want: &[u8]) -> Result<()> {
    if got == want {
        println!("{label} ... ok");
        info!(kat = label, "ok");
        return Ok(());
    }
    println!("{label} ... FAILED");
    println!("  expected: {}", hex(want));
    println!("  actual:   {}", hex(got));
    let diff: String = got
        .iter()
        .zip(want)
        .map(|(g, w)| if g == w { "__".to_string() } else { format!("{:02x}", g ^ w) })
        .collect();
    println!("  diff:     {diff}");
    Err(Error::interp(format!("KAT mismatch for {label}")))
}

/// Run a permutation KAT: generate once, interpret, compare.
pub fn check_permutation(platform: &Platform, func: &Func, label: &str, input: &[u8], expected: &[u8]) -> Result<()> {
    let mut state = input.to_vec();
    let mut vm = Interpreter::new(platform);
    vm.exec_permutation(func, &mut state)?;
    report(label, &state, expected)
}

/// Run a counted-permutation KAT.
pub fn check_permutation_count(
    platform: &Platform,
    func: &Func,
    label: &str,
    input: &[u8],
    count: u8,
    expected: &[u8],
) -> Result<()> {
    let mut state = input.to_vec();
    let mut vm = Interpreter::new(platform);
    vm.exec_permutation_count(func, &mut state, count)?;
    report(label, &state, expected)
}

/// Run a key-setup KAT against an expected schedule image.
pub fn check_setup_key(
    platform: &Platform,
    func: &Func,
    label: &str,
    key: &[u8],
    expected_schedule: &[u8],
) -> Result<()> {
    let mut schedule = vec![0u8; expected_schedule.len()];
    let mut vm = Interpreter::new(platform);
    vm.exec_setup_key(func, key, &mut schedule)?;
    report(label, &schedule, expected_schedule)
}

/// Run a block-cipher KAT through a previously produced schedule.
pub fn check_encrypt_block(
    platform: &Platform,
    func: &Func,
    label: &str,
    schedule: &[u8],
    input: &[u8],
    expected: &[u8],
) -> Result<()> {
    let mut output = vec![0u8; expected.len()];
    let mut vm = Interpreter::new(platform);
    vm.exec_encrypt_block(func, schedule, input, &mut output)?;
    report(label, &output, expected)
}
