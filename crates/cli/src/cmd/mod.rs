pub mod inspect;
pub mod sign_check;
