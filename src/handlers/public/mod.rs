// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route prefix: none or /public. Inputs come from anonymous callers and are
// validated in full before anything is written.
pub mod forms;
pub mod system;
