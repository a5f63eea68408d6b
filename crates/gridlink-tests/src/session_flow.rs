//! Session and ordering scenarios across the facade, queue and session
//! manager.
