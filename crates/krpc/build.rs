fn main() {
    for (var, exported) in [("TARGET", "KRPC_BUILD_TARGET"), ("PROFILE", "KRPC_BUILD_PROFILE")] {
        println!("cargo:rerun-if-env-changed={var}");
        if let Ok(value) = std::env::var(var) {
            println!("cargo:rustc-env={exported}={value}");
        }
    }
}
