pub mod carts;
pub mod checkout;
pub mod orders;
pub mod vouchers;

pub use carts::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use vouchers::VoucherService;
