//! End-to-end tests: discovery, token minting and generation against a
//! mockito stand-in for the playground.

mod integration;
