/// 列出本机摄像头, 用于选择 --camera 索引
use nabeeh::input::{default_format, format_camera_url, get_camera_devices};

fn main() {
    tracing_subscriber::fmt().init();

    let devices = get_camera_devices();
    if devices.is_empty() {
        println!("❌ 未找到可用摄像头");
        return;
    }

    println!("📷 可用摄像头 (格式: {}):", default_format());
    for (index, name) in devices {
        println!("  [{}] {}  →  {}", index, name, format_camera_url(index, &name));
    }
    println!("\n使用: nabeeh --camera <索引>");
}
