pub mod balance;
pub mod deposit;
pub mod order;
pub mod risk_event;
pub mod trade;
pub mod trading_pair;
pub mod user;
pub mod withdrawal;

pub use balance::*;
pub use deposit::*;
pub use order::*;
pub use risk_event::*;
pub use trade::*;
pub use trading_pair::*;
pub use user::*;
pub use withdrawal::*;
