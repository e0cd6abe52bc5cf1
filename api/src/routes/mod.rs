pub mod decisions;
pub mod dispatch;
pub mod health;
pub mod logs;
