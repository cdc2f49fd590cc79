//! 증권사 API 커넥터.

pub mod kis;
