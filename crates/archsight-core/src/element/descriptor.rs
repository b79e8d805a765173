//! JVM descriptor helpers.
//!
//! Only the pieces the analysis needs: the class named by a field descriptor
//! and the return type of a method descriptor. Primitive types yield `None`.

/// Class named by a field descriptor, with array dimensions stripped.
///
/// `Lcom/example/Foo;` and `[[Lcom/example/Foo;` both yield `com/example/Foo`.
pub fn field_type_name(descriptor: &str) -> Option<&str> {
    let stripped = descriptor.trim_start_matches('[');
    stripped
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|name| !name.is_empty())
}

/// Class named by the return type of a method descriptor.
pub fn return_type_name(descriptor: &str) -> Option<&str> {
    let (_, ret) = descriptor.rsplit_once(')')?;
    field_type_name(ret)
}

/// Simple name of a binary class name: `com/example/Outer$Inner` → `Inner`.
pub fn simple_name(binary_name: &str) -> &str {
    let after_package = binary_name
        .rsplit(['/', '.'])
        .next()
        .unwrap_or(binary_name);
    after_package.rsplit('$').next().unwrap_or(after_package)
}

/// Binary name with `.` separators normalized to `/`.
pub fn normalize(name: &str) -> String {
    name.replace('.', "/")
}
