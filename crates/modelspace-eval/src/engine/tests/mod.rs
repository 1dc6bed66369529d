mod common;
mod inheritance;
mod persistence;
