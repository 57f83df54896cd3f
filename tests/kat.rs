use gencrypto::registry;

#[test]
fn registry_lists_lexicographically() {
    let entries = registry::global().entries();
    assert!(!entries.is_empty());
    let keys: Vec<(&str, &str, &str)> = entries
        .iter()
        .map(|e| (e.name, e.variant, e.platform))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn lookup_by_qualified_name_and_function() {
    let reg = registry::global();
    let entry = reg.lookup("keccak-p:200:avr").expect("registered");
    assert_eq!(entry.func_name, "keccakp_200_permute");
    let entry = reg.find_func("aes_ecb_encrypt").expect("registered");
    assert_eq!(entry.name, "aes");
    assert!(reg.lookup("keccak-p:200:armageddon").is_none());
}

fn run(qualified: &str) {
    let entry = registry::global().lookup(qualified).expect("registered");
    (entry.kat)().unwrap_or_else(|e| panic!("{qualified}: {e}"));
}

#[test]
fn keccak_200_known_answers() {
    run("keccak-p:200:avr");
}

#[test]
fn keccak_400_known_answers() {
    run("keccak-p:400:avr");
}

#[test]
fn keccak_1600_known_answers() {
    run("keccak-p:1600:arm");
}

#[test]
fn tinyjambu_128_known_answers() {
    run("tinyjambu:128:avr");
}

#[test]
fn tinyjambu_192_known_answers() {
    run("tinyjambu:192:avr");
}

#[test]
fn tinyjambu_256_known_answers() {
    run("tinyjambu:256:avr");
}

#[test]
fn aes_128_schedule_known_answers() {
    run("aes:128-init:avr");
}

#[test]
fn aes_192_schedule_known_answers() {
    run("aes:192-init:avr");
}

#[test]
fn aes_256_schedule_known_answers() {
    run("aes:256-init:avr");
}

#[test]
fn aes_ecb_known_answers() {
    run("aes:ecb:avr");
}

#[test]
fn sha256_known_answers() {
    run("sha256:arm");
}

#[test]
fn ascon_known_answers() {
    run("ascon:avr");
}

#[test]
fn xoodoo_known_answers() {
    run("xoodoo:arm");
}
