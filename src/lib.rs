pub mod config;
pub mod control;
pub mod emu;
pub mod mab;
pub mod net;
pub mod plane;
pub mod probe;

#[cfg(test)]
mod test;
