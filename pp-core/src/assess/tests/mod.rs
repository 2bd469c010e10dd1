mod logs_test;

use assertables::*;
use pp_testutils::*;
use rstest::*;
use tracing_test::traced_test;

use super::*;
