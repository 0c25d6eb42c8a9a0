//! Tick-size rules. The minimum price increment grows in steps with the
//! price magnitude; limit prices must land exactly on a tick.
//!
//! | price range      | tick  |
//! |------------------|-------|
//! | ..=1_000         | 1     |
//! | ..=5_000         | 5     |
//! | ..=10_000        | 10    |
//! | ..=50_000        | 50    |
//! | ..=100_000       | 100   |
//! | ..=500_000       | 500   |
//! | above            | 1_000 |

use crate::types::order::Price;

pub fn tick_size(price: Price) -> i64 {
    match price {
        p if p <= 1_000 => 1,
        p if p <= 5_000 => 5,
        p if p <= 10_000 => 10,
        p if p <= 50_000 => 50,
        p if p <= 100_000 => 100,
        p if p <= 500_000 => 500,
        _ => 1_000,
    }
}

/// Round up to the nearest valid tick.
pub fn adjust_up(price: Price) -> Price {
    let tick = tick_size(price);
    (price + tick - 1) / tick * tick
}

/// Round down to the nearest valid tick.
pub fn adjust_down(price: Price) -> Price {
    let tick = tick_size(price);
    (price / tick) * tick
}

pub fn is_valid_tick(price: Price) -> bool {
    price > 0 && price % tick_size(price) == 0
}
