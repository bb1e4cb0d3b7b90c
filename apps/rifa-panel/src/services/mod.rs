pub mod commission_service;
pub mod network_service;
pub mod order_service;
pub mod prize_service;
pub mod referral_service;
pub mod roulette_service;
pub mod ticket_service;

#[cfg(test)]
pub(crate) mod test_support;

