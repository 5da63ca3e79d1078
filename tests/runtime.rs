/*!
 * Runtime intrinsic tests entry point
 */

#[path = "runtime/arith_props_test.rs"]
mod arith_props_test;

#[path = "runtime/group_props_test.rs"]
mod group_props_test;
