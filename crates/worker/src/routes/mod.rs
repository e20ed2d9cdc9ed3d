pub mod health;
pub mod ticks;
