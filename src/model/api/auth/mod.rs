mod token;

pub use token::{AdminToken, AUTHORIZATION_SCHEME};
