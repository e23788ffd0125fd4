use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{AlgorithmHint, Mat, Size, CV_32FC3},
    imgproc,
    prelude::*,
};

/// MoveNet用の入力サイズ(正方形)
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// SpinePose用の入力サイズ (幅, 高さ)
pub const SPINEPOSE_INPUT_SIZE: (i32, i32) = (192, 256);

/// RTMW3D用の入力サイズ (幅, 高さ)
pub const RTMW3D_INPUT_SIZE: (i32, i32) = (288, 384);

/// mmpose系モデルの入力正規化定数 (RGB順)
const RTM_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const RTM_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// BGRフレームをRGB・指定サイズ・f32に変換する共通前段
fn resize_rgb_f32(frame: &Mat, width: i32, height: i32) -> Result<Mat> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(
        frame,
        &mut rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;
    Ok(float_mat)
}

/// f32 Mat を [1, H, W, 3] テンソルへ。normalize指定時はmmpose統計で正規化。
fn tensor_nhwc(float_mat: &Mat, width: i32, height: i32, normalize: bool) -> Result<Array4<f32>> {
    let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));
    for y in 0..height {
        for x in 0..width {
            let pixel = float_mat.at_2d::<opencv::core::Vec3f>(y, x)?;
            for c in 0..3 {
                let v = if normalize {
                    (pixel[c] - RTM_MEAN[c]) / RTM_STD[c]
                } else {
                    pixel[c]
                };
                tensor[[0, y as usize, x as usize, c]] = v;
            }
        }
    }
    Ok(tensor)
}

/// MoveNet入力: [1, 192, 192, 3]、0.0〜255.0のまま
pub fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    let float_mat = resize_rgb_f32(frame, MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE)?;
    tensor_nhwc(&float_mat, MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE, false)
}

/// SpinePose入力: [1, 256, 192, 3]、正規化済み
pub fn preprocess_for_spinepose(frame: &Mat) -> Result<Array4<f32>> {
    let (w, h) = SPINEPOSE_INPUT_SIZE;
    let float_mat = resize_rgb_f32(frame, w, h)?;
    tensor_nhwc(&float_mat, w, h, true)
}

/// RTMW3D入力: [1, 384, 288, 3]、正規化済み
pub fn preprocess_for_rtmw3d(frame: &Mat) -> Result<Array4<f32>> {
    let (w, h) = RTMW3D_INPUT_SIZE;
    let float_mat = resize_rgb_f32(frame, w, h)?;
    tensor_nhwc(&float_mat, w, h, true)
}
