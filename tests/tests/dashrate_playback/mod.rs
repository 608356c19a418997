//! Integration tests for dashrate-playback

mod session_scenarios;
