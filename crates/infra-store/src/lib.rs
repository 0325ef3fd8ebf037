// Provisor Infrastructure - Credential Store Adapter
// Implements: CredentialStore over a JSON file

mod credential_file;

pub use credential_file::JsonFileCredentialStore;
