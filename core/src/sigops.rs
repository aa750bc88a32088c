use bitcoin::blockdata::script::Instruction;
use bitcoin::{Script, Transaction};

/// Count signature operations in a script the legacy way: CHECKSIG counts
/// one, CHECKMULTISIG counts the worst case of 20.
fn count_script_sig_ops(script: &Script) -> i64 {
    let mut count = 0i64;

    for instruction in script.instructions() {
        if let Ok(Instruction::Op(op)) = instruction {
            use bitcoin::opcodes::all::*;
            match op {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => count += 20,
                _ => {}
            }
        }
    }

    count
}

/// Legacy signature-operation count of a transaction: script sigs plus
/// output scripts, no P2SH or witness accounting.
pub fn get_legacy_sig_op_count(tx: &Transaction) -> i64 {
    let mut count = 0i64;
    for input in &tx.input {
        count += count_script_sig_ops(&input.script_sig);
    }
    for output in &tx.output {
        count += count_script_sig_ops(&output.script_pubkey);
    }
    count
}
