// 构建脚本: Windows 下静态链接 FFmpeg 所需的系统库
fn main() {
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // DirectShow 摄像头采集
        println!("cargo:rustc-link-lib=dylib=strmiids");
        println!("cargo:rustc-link-lib=dylib=ole32");
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (TLS)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
