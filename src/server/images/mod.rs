pub mod handlers;
pub mod routes;
pub mod sink;

#[cfg(test)]
mod tests;
