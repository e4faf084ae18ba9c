/// Expands into one `#[test]` per backend inside a module named after the
/// test, e.g. `crud_tests::update_reads_back::memory`. The closure argument
/// names the setup function the body calls to get a fresh store.
#[macro_export]
macro_rules! db_matrix_test {
    ($name:ident, |$setup:ident| $body:block) => {
        mod $name {
            #[allow(unused_imports)]
            use super::*;

            #[test]
            fn memory() {
                let backend = crate::common::TestBackend::Memory;
                if !crate::common::backend_enabled(backend) {
                    eprintln!("skipping {}::memory", stringify!($name));
                    return;
                }
                #[allow(unused_variables)]
                let $setup = || crate::common::setup_backend(backend);
                $body
            }

            #[test]
            fn arango() {
                let backend = crate::common::TestBackend::Arango;
                if !crate::common::backend_enabled(backend) {
                    eprintln!(
                        "skipping {}::arango (set PLP_BOOKSTORE_TEST_BACKENDS=memory,arango)",
                        stringify!($name)
                    );
                    return;
                }
                #[allow(unused_variables)]
                let $setup = || crate::common::setup_backend(backend);
                $body
            }
        }
    };
}
