//! Atomic invocation of a program against persistent storage.
//!
//! Storage writes go to an [`OverlayState`] and reach the caller's storage
//! only when the run halts successfully. An aborted invocation leaves storage
//! untouched.

use crate::types::bytes::Bytes;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::state::{OverlayState, State};
use crate::virtual_machine::vm::{CallData, VM, VmConfig};
use crate::{debug, warn};

/// Runs `program` once with `calldata` and commits its storage writes to
/// `state` on success.
///
/// Returns the output designated by `RETURN` (empty for `STOP` or running off
/// the end). On failure no write is committed and the error is returned.
pub fn invoke<S: State>(
    program: &Program,
    calldata: CallData,
    state: &mut S,
    config: &VmConfig,
) -> Result<Bytes, VMError> {
    let mut overlay = OverlayState::new(&*state);
    let mut vm = VM::new(program, calldata, config.clone());

    let output = match vm.run(&mut overlay) {
        Ok(output) => output,
        Err(e) => {
            warn!("invocation aborted after {} steps: {e}", vm.steps());
            return Err(e);
        }
    };

    let writes = overlay.into_writes();
    debug!(
        "invocation halted after {} steps, committing {} storage writes",
        vm.steps(),
        writes.len()
    );
    state.apply(writes);
    Ok(output)
}
