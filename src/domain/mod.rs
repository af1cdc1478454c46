pub mod state;
pub mod thought;
