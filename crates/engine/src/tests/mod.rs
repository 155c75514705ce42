mod compaction_tests;
mod helpers;
mod write_tests;
