mod common;
mod create_evidence;
mod verify_evidence;
