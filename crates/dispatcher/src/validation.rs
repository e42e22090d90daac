use tutor_core::{TutorError, TutorResult};

/// 支持的图片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    /// 根据文件头识别图片格式
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(ImageFormat::Webp)
            }
            [b'B', b'M', ..] => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}

/// 提交图片的校验器
#[derive(Debug, Clone)]
pub struct ImageValidator {
    max_bytes: usize,
}

impl ImageValidator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 校验图片不为空、不超过大小上限并且是可识别的格式
    pub fn validate(&self, image: &[u8]) -> TutorResult<ImageFormat> {
        if image.is_empty() {
            return Err(TutorError::Validation("图片数据不能为空".to_string()));
        }

        if image.len() > self.max_bytes {
            return Err(TutorError::Validation(format!(
                "图片大小 {} 字节超过上限 {} 字节",
                image.len(),
                self.max_bytes
            )));
        }

        ImageFormat::detect(image).ok_or_else(|| {
            TutorError::Validation("无法识别的图片格式，仅支持 JPEG/PNG/GIF/WEBP/BMP".to_string())
        })
    }
}
